use sqlx::{sqlite::SqliteRow, Row};

use atlas_core::audit::{InvocationStatus, ToolInvocation, ToolInvocationSink};
use atlas_core::domain::tool::ToolName;
use atlas_core::errors::ApplicationError;

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

/// SQL-backed audit trail for tool executions.
pub struct SqlToolLogRepository {
    pool: DbPool,
}

impl SqlToolLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, invocation: &ToolInvocation) -> Result<(), RepositoryError> {
        let parameters = serde_json::to_string(&invocation.parameters)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let result = serde_json::to_string(&invocation.result_or_error)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO construction_tool_logs (
                execution_id,
                tool_name,
                parameters_json,
                status,
                cost_cents,
                result_json,
                user_id,
                project_id,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&invocation.execution_id)
        .bind(invocation.tool_name.as_str())
        .bind(parameters)
        .bind(invocation.status.as_str())
        .bind(invocation.cost_cents)
        .bind(result)
        .bind(&invocation.user_id)
        .bind(&invocation.project_id)
        .bind(invocation.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest first.
    pub async fn list_for(
        &self,
        user_id: &str,
        project_id: &str,
        limit: u32,
    ) -> Result<Vec<ToolInvocation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT execution_id, tool_name, parameters_json, status, cost_cents, result_json,
                    user_id, project_id, created_at
             FROM construction_tool_logs
             WHERE user_id = ? AND project_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(project_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(invocation_from_row).collect()
    }
}

#[async_trait::async_trait]
impl ToolInvocationSink for SqlToolLogRepository {
    async fn record(&self, invocation: ToolInvocation) -> Result<(), ApplicationError> {
        self.append(&invocation).await.map_err(ApplicationError::from)
    }
}

fn invocation_from_row(row: &SqliteRow) -> Result<ToolInvocation, RepositoryError> {
    let decode = |error: sqlx::Error| RepositoryError::Decode(error.to_string());
    let tool_name: String = row.try_get("tool_name").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let parameters: String = row.try_get("parameters_json").map_err(decode)?;
    let result: String = row.try_get("result_json").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    Ok(ToolInvocation {
        execution_id: row.try_get("execution_id").map_err(decode)?,
        tool_name: tool_name.parse::<ToolName>().map_err(RepositoryError::Decode)?,
        parameters: serde_json::from_str(&parameters)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        status: InvocationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown tool status `{status}`")))?,
        cost_cents: row.try_get("cost_cents").map_err(decode)?,
        result_or_error: serde_json::from_str(&result)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        user_id: row.try_get("user_id").map_err(decode)?,
        project_id: row.try_get("project_id").map_err(decode)?,
        timestamp: parse_timestamp("construction_tool_logs.created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use atlas_core::audit::{InvocationStatus, ToolInvocation, ToolInvocationSink};
    use atlas_core::domain::tool::ToolName;

    use super::SqlToolLogRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn records_pending_and_failed_invocations() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let log = SqlToolLogRepository::new(pool);

        log.record(
            ToolInvocation::new(
                ToolName::SendEmail,
                json!({"to": "pm@example.com", "subject": "Pour", "body": "Moved"}),
                InvocationStatus::PendingApproval,
                "u1",
                "proj-downtown",
            )
            .with_outcome(json!({"requires_approval": true})),
        )
        .await
        .expect("record pending");
        log.record(
            ToolInvocation::new(
                ToolName::CreateChangeOrder,
                json!({"project_id": "proj-downtown"}),
                InvocationStatus::Failed,
                "u1",
                "proj-downtown",
            )
            .with_outcome(json!({"error": "missing required parameters: description, cost_impact"})),
        )
        .await
        .expect("record failed");

        let entries = log.list_for("u1", "proj-downtown", 10).await.expect("list");
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.cost_cents == 0.0));
        assert!(entries
            .iter()
            .any(|entry| entry.status == InvocationStatus::PendingApproval
                && entry.tool_name == ToolName::SendEmail));
        assert!(entries.iter().any(|entry| entry.status == InvocationStatus::Failed));
    }
}
