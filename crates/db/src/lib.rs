pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{DemoPortfolio, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryKeyValueStore, InMemoryProjectDirectory, InMemorySpendLedger, KeyValueStore,
    ProjectDirectory, RepositoryError, SpendLedger, SqlKeyValueStore, SqlProjectDirectory,
    SqlSpendLedger, SqlToolLogRepository,
};
