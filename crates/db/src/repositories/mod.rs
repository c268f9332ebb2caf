use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use atlas_core::domain::project::{
    Communication, CommunicationChannel, ConstructionMetrics, Contractor, FinancialMetrics,
    Meeting, Project, ProjectId,
};
use atlas_core::domain::spend::DateKey;
use atlas_core::errors::ApplicationError;

pub mod kv;
pub mod memory;
pub mod project;
pub mod spend;
pub mod tool_log;

pub use kv::SqlKeyValueStore;
pub use memory::{InMemoryKeyValueStore, InMemoryProjectDirectory, InMemorySpendLedger};
pub use project::SqlProjectDirectory;
pub use spend::SqlSpendLedger;
pub use tool_log::SqlToolLogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

/// Overwrite-by-key JSON storage used for conversation memory.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError>;
    async fn upsert(&self, key: &str, value: Value) -> Result<(), RepositoryError>;
}

/// Daily AI spend in whole cents, keyed by UTC date.
///
/// `add` must be a single atomic increment in the backing store and returns the
/// new total for the day. Days that were never written read as zero.
#[async_trait]
pub trait SpendLedger: Send + Sync {
    async fn spent_on(&self, day: &DateKey) -> Result<u64, RepositoryError>;
    async fn add(&self, day: &DateKey, cents: u64) -> Result<u64, RepositoryError>;
}

/// Read-only view over project, contractor and communication data.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, RepositoryError>;

    async fn find_project(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError>;

    async fn financial_metrics(
        &self,
        id: &ProjectId,
    ) -> Result<Option<FinancialMetrics>, RepositoryError>;

    async fn construction_metrics(
        &self,
        id: &ProjectId,
    ) -> Result<Option<ConstructionMetrics>, RepositoryError>;

    async fn all_financial_metrics(&self) -> Result<Vec<FinancialMetrics>, RepositoryError>;

    async fn all_construction_metrics(&self) -> Result<Vec<ConstructionMetrics>, RepositoryError>;

    async fn list_contractors(
        &self,
        specialty: Option<&str>,
    ) -> Result<Vec<Contractor>, RepositoryError>;

    /// Newest first.
    async fn communications(
        &self,
        project_id: Option<&ProjectId>,
        channel: Option<CommunicationChannel>,
        limit: u32,
    ) -> Result<Vec<Communication>, RepositoryError>;

    /// Soonest first, starting at `after`.
    async fn upcoming_meetings(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Meeting>, RepositoryError>;
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value
        .trim()
        .parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal in {column}: {error}")))
}

pub(crate) fn parse_date(column: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("invalid date in {column}: {error}")))
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp in {column}: {error}")))
}

pub(crate) fn parse_string_list(column: &str, value: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid JSON list in {column}: {error}")))
}

#[cfg(test)]
mod tests {
    use atlas_core::errors::ApplicationError;

    use super::{parse_decimal, parse_timestamp, RepositoryError};

    #[test]
    fn repository_errors_become_persistence_failures() {
        let error = ApplicationError::from(RepositoryError::Decode("bad row".to_string()));
        assert_eq!(error, ApplicationError::Persistence("decode error: bad row".to_string()));
    }

    #[test]
    fn decode_helpers_reject_garbage() {
        assert!(parse_decimal("total_budget", "12500000.50").is_ok());
        assert!(matches!(
            parse_decimal("total_budget", "lots"),
            Err(RepositoryError::Decode(message)) if message.contains("total_budget")
        ));
        assert!(parse_timestamp("created_at", "2026-03-01T09:30:00Z").is_ok());
        assert!(parse_timestamp("created_at", "yesterday").is_err());
    }
}
