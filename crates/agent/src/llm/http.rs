use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use atlas_core::catalog::{ModelId, Provider};

use super::{Completion, CompletionRequest, LlmClient, LlmError};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const AZURE_API_VERSION: &str = "2024-02-01";

async fn send_json(builder: RequestBuilder, body: &Value) -> Result<Value, LlmError> {
    let response =
        builder.json(body).send().await.map_err(|error| LlmError::Transport(error.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(LlmError::Http { status: status.as_u16(), message: truncate(&message, 200) });
    }

    response.json::<Value>().await.map_err(|error| LlmError::Decode(error.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn chat_messages(request: &CompletionRequest) -> Value {
    json!([
        { "role": "system", "content": request.system },
        { "role": "user", "content": request.prompt },
    ])
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

fn parse_chat_response(
    body: Value,
    provider: Provider,
    fallback_model: &str,
) -> Result<Completion, LlmError> {
    let parsed: ChatResponse =
        serde_json::from_value(body).map_err(|error| LlmError::Decode(error.to_string()))?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))?;

    Ok(Completion {
        text,
        total_tokens: parsed.usage.map(|usage| usage.total_tokens),
        vendor_model: parsed.model.unwrap_or_else(|| fallback_model.to_string()),
        provider,
    })
}

pub struct OpenAiClient {
    http: Client,
    api_key: SecretString,
    url: String,
}

impl OpenAiClient {
    pub fn new(http: Client, api_key: SecretString) -> Self {
        Self { http, api_key, url: OPENAI_URL.to_string() }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let body = json!({
            "model": model.vendor_model(),
            "messages": chat_messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let builder = self.http.post(&self.url).bearer_auth(self.api_key.expose_secret());
        let response = send_json(builder, &body).await?;
        parse_chat_response(response, Provider::OpenAi, model.vendor_model())
    }
}

pub struct AzureOpenAiClient {
    http: Client,
    api_key: SecretString,
    endpoint: String,
    deployment: String,
}

impl AzureOpenAiClient {
    pub fn new(http: Client, api_key: SecretString, endpoint: String, deployment: String) -> Self {
        Self { http, api_key, endpoint: endpoint.trim_end_matches('/').to_string(), deployment }
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={AZURE_API_VERSION}",
            self.endpoint, self.deployment
        )
    }
}

#[async_trait]
impl LlmClient for AzureOpenAiClient {
    async fn complete(
        &self,
        _model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let body = json!({
            "messages": chat_messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let builder = self.http.post(self.url()).header("api-key", self.api_key.expose_secret());
        let response = send_json(builder, &body).await?;
        parse_chat_response(response, Provider::Azure, &self.deployment)
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

fn parse_anthropic_response(body: Value, fallback_model: &str) -> Result<Completion, LlmError> {
    let parsed: AnthropicResponse =
        serde_json::from_value(body).map_err(|error| LlmError::Decode(error.to_string()))?;
    let text = parsed
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| LlmError::Decode("response contained no text block".to_string()))?;

    Ok(Completion {
        text,
        total_tokens: parsed.usage.map(|usage| usage.input_tokens + usage.output_tokens),
        vendor_model: parsed.model.unwrap_or_else(|| fallback_model.to_string()),
        provider: Provider::Anthropic,
    })
}

pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    url: String,
}

impl AnthropicClient {
    pub fn new(http: Client, api_key: SecretString) -> Self {
        Self { http, api_key, url: ANTHROPIC_URL.to_string() }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let body = json!({
            "model": model.vendor_model(),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        let builder = self
            .http
            .post(&self.url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION);
        let response = send_json(builder, &body).await?;
        parse_anthropic_response(response, model.vendor_model())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    total_token_count: u64,
}

fn parse_gemini_response(body: Value, model: &str) -> Result<Completion, LlmError> {
    let parsed: GeminiResponse =
        serde_json::from_value(body).map_err(|error| LlmError::Decode(error.to_string()))?;
    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().find_map(|part| part.text))
        .ok_or_else(|| LlmError::Decode("response contained no candidates".to_string()))?;

    Ok(Completion {
        text,
        total_tokens: parsed.usage_metadata.map(|usage| usage.total_token_count),
        vendor_model: model.to_string(),
        provider: Provider::Google,
    })
}

pub struct GeminiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl GeminiClient {
    pub fn new(http: Client, api_key: SecretString) -> Self {
        Self { http, api_key, base_url: GEMINI_BASE_URL.to_string() }
    }

    /// Models root; the request path appends `/{model}:generateContent`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(
        &self,
        model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}\n\n{}", request.system, request.prompt) }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });
        let url = format!("{}/{}:generateContent", self.base_url, model.vendor_model());
        let builder = self.http.post(url).header("x-goog-api-key", self.api_key.expose_secret());
        let response = send_json(builder, &body).await?;
        parse_gemini_response(response, model.vendor_model())
    }
}
