use atlas_core::catalog::ProviderAvailability;
use atlas_core::config::AppConfig;
use atlas_db::DbPool;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    providers: ProviderSummary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderSummary {
    pub any_available: bool,
    pub offline_fallback: bool,
}

impl ProviderSummary {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            any_available: ProviderAvailability::from_config(&config.llm).any(),
            offline_fallback: config.llm.offline_fallback,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub providers: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, providers: ProviderSummary) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, providers })
}

/// Readiness follows the database only; missing providers are reported but
/// the assistant still answers with apologies or offline replies.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        providers: provider_check(state.providers),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn provider_check(providers: ProviderSummary) -> HealthCheck {
    match (providers.any_available, providers.offline_fallback) {
        (true, _) => {
            HealthCheck { status: "ready", detail: "model providers configured".to_string() }
        }
        (false, true) => HealthCheck {
            status: "offline",
            detail: "no model providers configured; offline replies enabled".to_string(),
        },
        (false, false) => HealthCheck {
            status: "degraded",
            detail: "no model providers configured".to_string(),
        },
    }
}
