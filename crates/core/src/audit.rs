use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::tool::ToolName;
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Failed,
    PendingApproval,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PendingApproval => "pending_approval",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "pending_approval" => Some(Self::PendingApproval),
            _ => None,
        }
    }
}

/// Append-only record of one tool execution attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub execution_id: String,
    pub tool_name: ToolName,
    pub parameters: Value,
    pub status: InvocationStatus,
    pub cost_cents: f64,
    pub result_or_error: Value,
    pub user_id: String,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn new(
        tool_name: ToolName,
        parameters: Value,
        status: InvocationStatus,
        user_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: format!("exec_{}", Uuid::new_v4().simple()),
            tool_name,
            parameters,
            status,
            cost_cents: 0.0,
            result_or_error: Value::Null,
            user_id: user_id.into(),
            project_id: project_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn with_cost(mut self, cost_cents: f64) -> Self {
        self.cost_cents = cost_cents;
        self
    }

    pub fn with_outcome(mut self, result_or_error: Value) -> Self {
        self.result_or_error = result_or_error;
        self
    }
}

#[async_trait]
pub trait ToolInvocationSink: Send + Sync {
    async fn record(&self, invocation: ToolInvocation) -> Result<(), ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryToolInvocationSink {
    invocations: Arc<Mutex<Vec<ToolInvocation>>>,
}

impl InMemoryToolInvocationSink {
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        match self.invocations.lock() {
            Ok(invocations) => invocations.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ToolInvocationSink for InMemoryToolInvocationSink {
    async fn record(&self, invocation: ToolInvocation) -> Result<(), ApplicationError> {
        match self.invocations.lock() {
            Ok(mut invocations) => invocations.push(invocation),
            Err(poisoned) => poisoned.into_inner().push(invocation),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::audit::{
        InMemoryToolInvocationSink, InvocationStatus, ToolInvocation, ToolInvocationSink,
    };
    use crate::domain::tool::ToolName;

    #[tokio::test]
    async fn in_memory_sink_keeps_append_order() {
        let sink = InMemoryToolInvocationSink::default();
        sink.record(
            ToolInvocation::new(
                ToolName::CreateChangeOrder,
                json!({"project_id": "proj-downtown"}),
                InvocationStatus::Failed,
                "u1",
                "proj-downtown",
            )
            .with_outcome(json!({"error": "missing required parameters"})),
        )
        .await
        .expect("record failed invocation");
        sink.record(
            ToolInvocation::new(
                ToolName::GetProjectStatus,
                json!({"project_id": "portfolio"}),
                InvocationStatus::Success,
                "u1",
                "portfolio",
            )
            .with_cost(0.001),
        )
        .await
        .expect("record success");

        let invocations = sink.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].status, InvocationStatus::Failed);
        assert_eq!(invocations[0].cost_cents, 0.0);
        assert_eq!(invocations[1].tool_name, ToolName::GetProjectStatus);
        assert!(invocations[1].execution_id.starts_with("exec_"));
    }

    #[test]
    fn status_wire_names_round_trip() {
        for status in
            [InvocationStatus::Success, InvocationStatus::Failed, InvocationStatus::PendingApproval]
        {
            assert_eq!(InvocationStatus::parse(status.as_str()), Some(status));
        }
    }
}
