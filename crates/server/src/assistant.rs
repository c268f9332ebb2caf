use std::sync::Arc;

use atlas_agent::{AssistantOutcome, AssistantRequest, AssistantResponse, AssistantRuntime};
use atlas_core::errors::DomainError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::warn;

pub fn router(runtime: Arc<AssistantRuntime>) -> Router {
    Router::new().route("/construction-assistant", post(construction_assistant)).with_state(runtime)
}

/// Always answers with the reply envelope; the status code carries the
/// failure class.
pub async fn construction_assistant(
    State(runtime): State<Arc<AssistantRuntime>>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> (StatusCode, Json<AssistantResponse>) {
    let outcome = match payload {
        Ok(Json(request)) => runtime.handle(request).await,
        Err(rejection) => {
            warn!(
                event_name = "http.assistant.rejected",
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "request body rejected"
            );
            AssistantOutcome::rejected(DomainError::MalformedRequest(rejection.body_text()).into())
        }
    };

    let status =
        StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.response))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use atlas_agent::{AssistantResponse, AssistantRuntime, RuntimeStores};
    use atlas_core::audit::InMemoryToolInvocationSink;
    use atlas_core::config::AppConfig;
    use atlas_db::{InMemoryKeyValueStore, InMemoryProjectDirectory, InMemorySpendLedger};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use crate::assistant::router;

    fn app(offline_fallback: bool) -> Router {
        let mut config = AppConfig::default();
        config.llm.offline_fallback = offline_fallback;
        let stores = RuntimeStores {
            memory: Arc::new(InMemoryKeyValueStore::default()),
            spend: Arc::new(InMemorySpendLedger::default()),
            directory: Arc::new(InMemoryProjectDirectory::default()),
            tool_log: Arc::new(InMemoryToolInvocationSink::default()),
        };
        let runtime = AssistantRuntime::from_config(&config, stores).expect("runtime");
        router(Arc::new(runtime))
    }

    async fn post(app: Router, body: &str) -> (StatusCode, AssistantResponse) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/construction-assistant")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("envelope"))
    }

    #[tokio::test]
    async fn empty_message_is_a_400_envelope() {
        let (status, body) = post(app(true), r#"{"message": ""}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert!(body.metadata.response_id.starts_with("error_"));
    }

    #[tokio::test]
    async fn malformed_json_still_returns_the_envelope() {
        let (status, body) = post(app(true), "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert!(body.conversation_id.starts_with("conv_"));
    }

    #[tokio::test]
    async fn no_providers_without_offline_is_a_503() {
        let (status, body) = post(app(false), r#"{"message": "Hello Atlas"}"#).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.success);
        assert!(body.model_info.is_none());
    }

    #[tokio::test]
    async fn offline_fallback_answers_with_200() {
        let (status, body) = post(
            app(true),
            r#"{"message": "Hello Atlas", "user_id": "u-7", "conversation_id": "conv_fixed"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert_eq!(body.conversation_id, "conv_fixed");
        assert!(body.response.starts_with("[Offline mode"));
        let model = body.model_info.expect("model info");
        assert_eq!(model.model_used, "atlas-offline");
        assert_eq!(model.estimated_cost_cents, 0);
    }
}
