use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::tool::ToolName;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing required parameters for {tool}: {}", .missing.join(", "))]
    MissingToolParameters { tool: ToolName, missing: Vec<String> },
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("assistant message must not be empty")]
    EmptyAssistantMessage,
    #[error("malformed request body: {0}")]
    MalformedRequest(String),
}

/// One failed attempt inside the model fallback cascade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub message: String,
}

impl fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.model, self.message)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("daily AI budget exceeded: spent {spent_cents} of {budget_cents} cents")]
    BudgetExceeded { spent_cents: u64, budget_cents: u64 },
    #[error("provider unavailable for {model}: {reason}")]
    ProviderUnavailable { model: String, reason: String },
    #[error("provider invocation failed for {model}: {message}")]
    ProviderInvocation { model: String, message: String },
    #[error("all models failed: {}", render_failures(.attempts))]
    ModelCascadeExhausted { attempts: Vec<ModelFailure> },
    #[error("summarization failed: {0}")]
    Summarization(String),
    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: ToolName, message: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

fn render_failures(attempts: &[ModelFailure]) -> String {
    if attempts.is_empty() {
        return "no models were available".to_owned();
    }
    attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "I couldn't process that request. Please check your message and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "I apologize, but I'm temporarily unable to answer. Please try again shortly."
            }
            Self::Internal { .. } => {
                "I apologize, but I encountered an error processing your request. Please try again."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Stable class name used in logs and CLI output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "validation",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::ProviderInvocation { .. } => "provider_invocation",
            Self::ModelCascadeExhausted { .. } => "model_cascade_exhausted",
            Self::Summarization(_) => "summarization",
            Self::ToolExecution { .. } => "tool_execution",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            error @ (ApplicationError::BudgetExceeded { .. }
            | ApplicationError::ProviderUnavailable { .. }
            | ApplicationError::ProviderInvocation { .. }
            | ApplicationError::ModelCascadeExhausted { .. }) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            error @ (ApplicationError::Summarization(_)
            | ApplicationError::ToolExecution { .. }
            | ApplicationError::Configuration(_)) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned }
            }
        }
    }
}
