use std::sync::Arc;

use atlas_agent::{AssistantRuntime, RuntimeStores};
use atlas_core::config::{AppConfig, ConfigError, LoadOptions};
use atlas_core::errors::ApplicationError;
use atlas_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AssistantRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("assistant runtime setup failed: {0}")]
    Runtime(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runtime = AssistantRuntime::from_config(&config, RuntimeStores::sql(db_pool.clone()))
        .map_err(BootstrapError::Runtime)?;

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

#[cfg(test)]
mod tests {
    use atlas_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                offline_fallback: Some(true),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_runtime() {
        let app = bootstrap(options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('conversation_memory', 'daily_spend', 'construction_tool_logs', 'projects')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected assistant tables after bootstrap");
        assert_eq!(table_count, 4);
        assert!(app.config.llm.offline_fallback);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_unreachable_database() {
        let result = bootstrap(options("sqlite:///nonexistent-dir/atlas/atlas.db")).await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("database connection failed"));
    }
}
