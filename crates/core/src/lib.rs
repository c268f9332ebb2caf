pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod tokens;

pub use audit::{InMemoryToolInvocationSink, InvocationStatus, ToolInvocation, ToolInvocationSink};
pub use catalog::{ModelCatalog, ModelDescriptor, ModelId, Provider, ProviderAvailability};
pub use domain::conversation::{ConversationTurn, MemoryKey, TurnRole};
pub use domain::project::{
    Communication, CommunicationChannel, ConstructionMetrics, Contractor, FinancialMetrics,
    Meeting, Project, ProjectId, PORTFOLIO_PROJECT_ID,
};
pub use domain::routing::{LatencyRequirement, TaskType};
pub use domain::spend::{Clock, DateKey, FixedClock, SystemClock};
pub use domain::tool::{ToolName, ToolSpec};
pub use errors::{ApplicationError, DomainError, InterfaceError, ModelFailure};
pub use tokens::estimate_tokens;
