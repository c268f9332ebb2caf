//! Atlas assistant runtime.
//!
//! One request flows through memory retrieval, tool detection and execution,
//! prompt assembly, budget-aware model routing, memory storage and response
//! formatting. Each stage sits behind a trait so stores, providers and the
//! platform actions service can be swapped or faked:
//!
//! - [`router::LlmRouter`] picks a model under the daily budget and walks the
//!   fallback cascade.
//! - [`memory::MemoryManager`] keeps a token-bounded history per user and
//!   project, summarizing older turns.
//! - [`tools::ToolExecutor`] runs detected tools; side-effecting ones wait for
//!   approval and every attempt is audited.
//! - [`runtime::AssistantRuntime`] ties the stages together and never lets an
//!   internal error reach the caller.

pub mod formatter;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod platform;
pub mod prompt;
pub mod router;
pub mod runtime;
pub mod tools;
pub mod voice;

pub use runtime::{
    AssistantOutcome, AssistantRequest, AssistantResponse, AssistantRuntime, RuntimeStores,
};
