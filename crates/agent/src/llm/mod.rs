//! Provider adapters behind one completion interface.
//!
//! Model ids are resolved to a [`Provider`] once by the catalog; the router
//! looks up the adapter for that provider here and never inspects model names.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use atlas_core::catalog::{ModelId, Provider, ProviderAvailability};
use atlas_core::config::LlmConfig;
use atlas_core::errors::ApplicationError;

pub mod http;
pub mod offline;

pub use http::{AnthropicClient, AzureOpenAiClient, GeminiClient, OpenAiClient};
pub use offline::OfflineResponder;

pub const ATLAS_SYSTEM_PROMPT: &str =
    "You are Atlas, an expert construction management AI assistant.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn assistant(prompt: impl Into<String>) -> Self {
        Self {
            system: ATLAS_SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: Option<u64>,
    /// Model name reported by the vendor, which may differ from the catalog id.
    pub vendor_model: String,
    pub provider: Provider,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider not configured: {0}")]
    Unavailable(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Missing credentials read as an unavailable provider; every other
    /// failure is an invocation error against `model`.
    pub fn for_model(self, model: ModelId) -> ApplicationError {
        match self {
            LlmError::Unavailable(reason) => {
                ApplicationError::ProviderUnavailable { model: model.as_str().to_string(), reason }
            }
            other => ApplicationError::ProviderInvocation {
                model: model.as_str().to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError>;
}

/// Runs one completion bounded by `timeout`; elapsed time counts as a failure.
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    model: ModelId,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<Completion, LlmError> {
    match tokio::time::timeout(timeout, client.complete(model, request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout.as_secs())),
    }
}

/// Adapter per provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn LlmClient>>,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Provider, client: Arc<dyn LlmClient>) {
        self.clients.insert(provider, client);
    }

    pub fn with(mut self, provider: Provider, client: Arc<dyn LlmClient>) -> Self {
        self.register(provider, client);
        self
    }

    pub fn client_for(&self, provider: Provider) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&provider).cloned()
    }

    /// HTTP adapters for every provider with usable credentials.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let availability = ProviderAvailability::from_config(config);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;
        let mut registry = Self::default();

        if availability.openai {
            if let Some(key) = config.openai_api_key.clone() {
                registry.register(Provider::OpenAi, Arc::new(OpenAiClient::new(http.clone(), key)));
            }
        }
        if availability.azure {
            if let (Some(key), Some(endpoint), Some(deployment)) = (
                config.azure_api_key.clone(),
                config.azure_endpoint.clone(),
                config.azure_deployment.clone(),
            ) {
                registry.register(
                    Provider::Azure,
                    Arc::new(AzureOpenAiClient::new(http.clone(), key, endpoint, deployment)),
                );
            }
        }
        if availability.anthropic {
            if let Some(key) = config.anthropic_api_key.clone() {
                let client = AnthropicClient::new(http.clone(), key);
                registry.register(Provider::Anthropic, Arc::new(client));
            }
        }
        if availability.google {
            if let Some(key) = config.gemini_api_key.clone() {
                registry.register(Provider::Google, Arc::new(GeminiClient::new(http.clone(), key)));
            }
        }

        Ok(registry)
    }
}
