//! Boundary to the platform actions service that performs write tools.
//!
//! The executor only builds well-formed requests and reads the `success`
//! flag of the reply; resource-specific fields are passed through untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use atlas_core::config::ToolsConfig;
use atlas_core::domain::tool::ToolName;
use atlas_core::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlatformActionRequest {
    pub action: String,
    pub resource: String,
    pub data: Value,
    pub user_id: String,
    pub project_id: String,
    pub ai_request_id: String,
    pub require_confirmation: bool,
}

impl PlatformActionRequest {
    pub fn for_tool(
        tool: ToolName,
        data: Value,
        user_id: &str,
        project_id: &str,
        ai_request_id: &str,
    ) -> Self {
        let (action, resource) = tool.platform_action();
        Self {
            action: action.to_string(),
            resource: resource.to_string(),
            data,
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            ai_request_id: ai_request_id.to_string(),
            require_confirmation: false,
        }
    }
}

#[async_trait]
pub trait PlatformActions: Send + Sync {
    /// Returns the service's reply when it reports `success: true`.
    async fn perform(&self, request: &PlatformActionRequest) -> Result<Value, ApplicationError>;
}

/// Accepts a reply only when it carries `success: true`.
pub fn interpret_reply(body: Value) -> Result<Value, ApplicationError> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let message = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("platform action reported failure")
        .to_string();
    Err(ApplicationError::Integration(message))
}

pub struct HttpPlatformActions {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpPlatformActions {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ApplicationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(Self { client, url: url.into(), api_key })
    }
}

#[async_trait]
impl PlatformActions for HttpPlatformActions {
    async fn perform(&self, request: &PlatformActionRequest) -> Result<Value, ApplicationError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            error!(
                event_name = "tools.platform.request_failed",
                action = %request.action,
                resource = %request.resource,
                error = %error,
                "platform action request failed"
            );
            ApplicationError::Integration(format!("platform action request failed: {error}"))
        })?;

        let status = response.status();
        let body = response.json::<Value>().await.map_err(|error| {
            ApplicationError::Integration(format!("platform action reply unreadable: {error}"))
        })?;
        if !status.is_success() {
            error!(
                event_name = "tools.platform.http_error",
                status = status.as_u16(),
                action = %request.action,
                resource = %request.resource,
                "platform action returned an error status"
            );
        }
        interpret_reply(body)
    }
}

pub struct UnconfiguredPlatformActions;

#[async_trait]
impl PlatformActions for UnconfiguredPlatformActions {
    async fn perform(&self, _request: &PlatformActionRequest) -> Result<Value, ApplicationError> {
        Err(ApplicationError::Integration("platform actions service is not configured".to_string()))
    }
}

pub fn platform_from_config(
    config: &ToolsConfig,
) -> Result<Arc<dyn PlatformActions>, ApplicationError> {
    match config.platform_actions_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Ok(Arc::new(HttpPlatformActions::new(
            url,
            config.platform_actions_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?)),
        None => Ok(Arc::new(UnconfiguredPlatformActions)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use atlas_core::config::AppConfig;
    use atlas_core::domain::tool::ToolName;
    use atlas_core::errors::ApplicationError;

    use super::{interpret_reply, platform_from_config, PlatformActionRequest};

    #[test]
    fn change_orders_are_created_and_messages_executed() {
        let request = PlatformActionRequest::for_tool(
            ToolName::CreateChangeOrder,
            json!({"cost_impact": 5000.0}),
            "u-1",
            "proj-green-valley",
            "exec_1",
        );
        assert_eq!(request.action, "create");
        assert_eq!(request.resource, "change_orders");
        assert!(!request.require_confirmation);

        let request =
            PlatformActionRequest::for_tool(ToolName::SendSms, json!({}), "u-1", "p", "exec_2");
        assert_eq!((request.action.as_str(), request.resource.as_str()), ("execute", "send_sms"));
    }

    #[test]
    fn only_an_explicit_success_flag_counts() {
        assert!(interpret_reply(json!({"success": true, "id": "co-9"})).is_ok());
        assert_eq!(
            interpret_reply(json!({"success": false, "error": "schedule locked"})),
            Err(ApplicationError::Integration("schedule locked".to_string()))
        );
        assert!(interpret_reply(json!({"id": "co-9"})).is_err());
    }

    #[tokio::test]
    async fn missing_url_yields_a_failing_boundary() {
        let platform = platform_from_config(&AppConfig::default().tools).expect("platform");
        let request =
            PlatformActionRequest::for_tool(ToolName::SendEmail, json!({}), "u", "p", "exec_3");

        assert!(matches!(
            platform.perform(&request).await,
            Err(ApplicationError::Integration(message)) if message.contains("not configured")
        ));
    }
}
