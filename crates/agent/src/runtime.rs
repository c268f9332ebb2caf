//! Orchestration entry point: one assistant request end to end.
//!
//! Order per request: validate, retrieve memory, run tools, build the prompt,
//! route to a model, store memory, optionally synthesize speech, format. Any
//! error that escapes becomes a `success = false` reply with a user-safe
//! message; the detail is only logged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use atlas_core::audit::ToolInvocationSink;
use atlas_core::catalog::{ModelCatalog, ModelId, ProviderAvailability};
use atlas_core::config::AppConfig;
use atlas_core::domain::conversation::MemoryKey;
use atlas_core::domain::project::{ProjectId, PORTFOLIO_PROJECT_ID};
use atlas_core::domain::routing::{LatencyRequirement, TaskType};
use atlas_core::domain::spend::{Clock, SystemClock};
use atlas_core::errors::{ApplicationError, DomainError, InterfaceError};
use atlas_db::{
    DbPool, KeyValueStore, ProjectDirectory, SpendLedger, SqlKeyValueStore, SqlProjectDirectory,
    SqlSpendLedger, SqlToolLogRepository,
};

use crate::formatter::{
    format_for_speech, format_response, tool_results_to_values, FormatInput, MemoryStats, UiHints,
};
use crate::guardrails::GuardrailPolicy;
use crate::intent::KeywordIntentClassifier;
use crate::llm::{OfflineResponder, ProviderRegistry};
use crate::memory::{LlmSummarizer, MemoryManager};
use crate::platform::platform_from_config;
use crate::prompt::{PromptBuilder, PromptInput};
use crate::router::{LlmRouter, RouteRequest};
use crate::tools::{ToolExecutor, ToolRequest};
use crate::voice::{DisabledSpeech, SpeechSynthesizer};

pub const DEFAULT_USER_ID: &str = "default_user";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct AssistantRequest {
    #[serde(default)]
    pub message: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub conversation_id: Option<String>,
    pub task_type: Option<TaskType>,
    pub latency_requirement: Option<LatencyRequirement>,
    pub ai_budget: Option<u64>,
    #[serde(default)]
    pub enable_voice: bool,
    #[serde(default)]
    pub voice_optimized: bool,
    pub context: Option<Value>,
    pub tools_enabled: Option<bool>,
    pub require_approval: Option<bool>,
}

impl AssistantRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    /// `context.tool_parameters`, when the caller sent one.
    fn tool_parameters(&self) -> Option<&Map<String, Value>> {
        self.context.as_ref()?.get("tool_parameters")?.as_object()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_used: String,
    pub provider: String,
    pub token_count: u64,
    pub estimated_cost_cents: u64,
    pub budget_used_percent: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyMetadata {
    pub timestamp: DateTime<Utc>,
    pub response_id: String,
    pub execution_time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub success: bool,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<Value>>,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_info: Option<MemoryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiHints>,
    pub metadata: ReplyMetadata,
}

/// Reply body plus the classified failure, if the request failed.
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantOutcome {
    pub response: AssistantResponse,
    pub failure: Option<InterfaceError>,
}

impl AssistantOutcome {
    /// Builds the `success = false` reply for an error and logs the detail.
    pub fn failed(
        failure: ApplicationError,
        conversation_id: String,
        correlation_id: String,
        started: Instant,
    ) -> Self {
        error!(
            event_name = "assistant.request.failed",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            error_class = failure.error_class(),
            error = %failure,
            "assistant request failed"
        );
        let failure = failure.into_interface(correlation_id.clone());
        let response = AssistantResponse {
            success: false,
            response: failure.user_message().to_string(),
            audio_url: None,
            tool_results: None,
            conversation_id,
            model_info: None,
            memory_info: None,
            ui: None,
            metadata: ReplyMetadata {
                timestamp: Utc::now(),
                response_id: format!("error_{correlation_id}"),
                execution_time_ms: elapsed_ms(started),
            },
        };
        Self { response, failure: Some(failure) }
    }

    /// Failure reply for a request that never reached the pipeline, such as a
    /// body that did not parse.
    pub fn rejected(failure: ApplicationError) -> Self {
        Self::failed(failure, new_conversation_id(), Uuid::new_v4().to_string(), Instant::now())
    }

    /// HTTP-style status for the reply: 200, 400, 503 or 500.
    pub fn status_code(&self) -> u16 {
        match &self.failure {
            None => 200,
            Some(InterfaceError::BadRequest { .. }) => 400,
            Some(InterfaceError::ServiceUnavailable { .. }) => 503,
            Some(InterfaceError::Internal { .. }) => 500,
        }
    }
}

/// The store boundaries a runtime is built on.
#[derive(Clone)]
pub struct RuntimeStores {
    pub memory: Arc<dyn KeyValueStore>,
    pub spend: Arc<dyn SpendLedger>,
    pub directory: Arc<dyn ProjectDirectory>,
    pub tool_log: Arc<dyn ToolInvocationSink>,
}

impl RuntimeStores {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            memory: Arc::new(SqlKeyValueStore::new(pool.clone())),
            spend: Arc::new(SqlSpendLedger::new(pool.clone())),
            directory: Arc::new(SqlProjectDirectory::new(pool.clone())),
            tool_log: Arc::new(SqlToolLogRepository::new(pool)),
        }
    }
}

pub struct AssistantRuntime {
    router: LlmRouter,
    memory: MemoryManager,
    tools: ToolExecutor,
    directory: Arc<dyn ProjectDirectory>,
    prompts: PromptBuilder,
    speech: Arc<dyn SpeechSynthesizer>,
    default_budget_cents: u64,
}

impl AssistantRuntime {
    pub fn new(
        router: LlmRouter,
        memory: MemoryManager,
        tools: ToolExecutor,
        directory: Arc<dyn ProjectDirectory>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            router,
            memory,
            tools,
            directory,
            prompts,
            speech: Arc::new(DisabledSpeech),
            default_budget_cents: AppConfig::default().llm.default_daily_budget_cents,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_default_budget(mut self, cents: u64) -> Self {
        self.default_budget_cents = cents;
        self
    }

    /// Wires every component from configuration on top of `stores`.
    pub fn from_config(
        config: &AppConfig,
        stores: RuntimeStores,
    ) -> Result<Self, ApplicationError> {
        let llm = &config.llm;
        let timeout = Duration::from_secs(llm.request_timeout_secs);
        let catalog = ModelCatalog::from_config(llm);
        let availability = ProviderAvailability::from_config(llm);
        let registry = ProviderRegistry::from_config(llm)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let summary_model = summary_model(&catalog, &availability, llm.summary_model);
        let summarizer = LlmSummarizer::new(registry.clone(), summary_model, timeout);

        let mut router =
            LlmRouter::new(catalog, availability, registry, stores.spend, clock.clone())
                .with_timeout(timeout);
        if llm.offline_fallback {
            router = router.with_offline(Arc::new(OfflineResponder::new()));
        }

        let memory = MemoryManager::new(stores.memory, Arc::new(summarizer)).with_timeout(timeout);
        let tools = ToolExecutor::new(
            Arc::new(KeywordIntentClassifier::new()),
            stores.directory.clone(),
            platform_from_config(&config.tools)?,
            stores.tool_log,
            clock,
        )
        .with_guardrails(GuardrailPolicy::from_config(&config.tools));

        info!(
            event_name = "runtime.configured",
            providers_available = availability.any(),
            offline_fallback = llm.offline_fallback,
            summary_model = %summary_model,
            write_tools_enabled = config.tools.write_enabled,
            "assistant runtime configured"
        );

        Ok(Self::new(router, memory, tools, stores.directory, PromptBuilder::new()?)
            .with_default_budget(llm.default_daily_budget_cents))
    }

    /// Never fails: errors become a `success = false` reply.
    pub async fn handle(&self, request: AssistantRequest) -> AssistantOutcome {
        let started = Instant::now();
        let correlation_id = Uuid::new_v4().to_string();
        let conversation_id = request
            .conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_conversation_id);

        match self.run(&request, &conversation_id, &correlation_id, started).await {
            Ok(response) => AssistantOutcome { response, failure: None },
            Err(failure) => {
                AssistantOutcome::failed(failure, conversation_id, correlation_id, started)
            }
        }
    }

    async fn run(
        &self,
        request: &AssistantRequest,
        conversation_id: &str,
        correlation_id: &str,
        started: Instant,
    ) -> Result<AssistantResponse, ApplicationError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }

        let user_id = request
            .user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(DEFAULT_USER_ID);
        let project_id = ProjectId(
            request
                .project_id
                .as_deref()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(PORTFOLIO_PROJECT_ID)
                .to_string(),
        );
        let task_type = request.task_type.unwrap_or_default();
        let latency = request.latency_requirement.unwrap_or_default();
        let budget = request.ai_budget.unwrap_or(self.default_budget_cents);

        info!(
            event_name = "assistant.request.received",
            correlation_id,
            conversation_id,
            user_id,
            project_id = %project_id.0,
            task_type = %task_type,
            message_length = message.len(),
            "assistant request received"
        );

        let memory_key = MemoryKey::new(user_id, project_id.0.clone());
        let snapshot = self.memory.retrieve(&memory_key).await?;

        let tool_results = if request.tools_enabled.unwrap_or(true) {
            let tool_request = ToolRequest {
                message,
                project_id: &project_id,
                user_id,
                require_approval: request.require_approval.unwrap_or(true),
                parameter_overrides: request.tool_parameters(),
            };
            self.tools.analyze_and_execute(&tool_request).await
        } else {
            Vec::new()
        };
        let tool_values = tool_results_to_values(&tool_results);

        let project_name = self.project_name(&project_id).await;
        let prompt = self.prompts.build(&PromptInput {
            message,
            history: &snapshot.history,
            project_id: &project_id,
            project_name: project_name.as_deref(),
            live_data: tool_values.first(),
            dashboard_context: request.context.as_ref(),
        })?;

        let routed = self
            .router
            .route(&RouteRequest {
                prompt,
                task_type,
                latency,
                daily_budget_cents: budget,
            })
            .await?;

        info!(
            event_name = "assistant.request.routed",
            correlation_id,
            selected = ?routed.decision.selected,
            model_used = %routed.model_used,
            provider = %routed.provider,
            available_models = routed.decision.available.len(),
            budget_conservation = routed.decision.budget_conservation,
            fallbacks = routed.decision.fallbacks_attempted.len(),
            cost_cents = routed.cost_cents,
            "model answered"
        );

        let memory_info = match self
            .memory
            .store(&memory_key, Some(message), &routed.response_text)
            .await
        {
            Ok(stored) => Some(MemoryStats {
                total_messages: stored.total_messages,
                total_tokens: stored.total_tokens,
                was_summarized: stored.was_summarized,
            }),
            Err(error) => {
                warn!(
                    event_name = "assistant.memory.store_failed",
                    correlation_id,
                    memory_key = %memory_key,
                    error = %error,
                    "conversation memory was not updated"
                );
                None
            }
        };

        let audio_url = if request.enable_voice {
            self.synthesize(&routed.response_text, request.voice_optimized, correlation_id).await
        } else {
            None
        };

        let envelope = format_response(&FormatInput {
            text: &routed.response_text,
            audio_url: audio_url.as_deref(),
            tool_results: &tool_values,
            memory: memory_info,
            is_streaming: false,
            voice_optimized: request.voice_optimized,
            conversation_id,
            user_id,
        });

        let execution_time_ms = elapsed_ms(started);
        info!(
            event_name = "assistant.request.completed",
            correlation_id,
            model_used = %routed.model_used,
            cost_cents = routed.cost_cents,
            execution_time_ms,
            has_audio = audio_url.is_some(),
            tool_count = tool_values.len(),
            "assistant request completed"
        );

        Ok(AssistantResponse {
            success: true,
            response: routed.response_text,
            audio_url,
            tool_results: Some(tool_values),
            conversation_id: conversation_id.to_string(),
            model_info: Some(ModelInfo {
                model_used: routed.model_used.to_string(),
                provider: routed.provider.to_string(),
                token_count: routed.token_count,
                estimated_cost_cents: routed.cost_cents,
                budget_used_percent: routed.budget_used_percent,
            }),
            memory_info,
            ui: Some(envelope.ui),
            metadata: ReplyMetadata {
                timestamp: envelope.metadata.timestamp,
                response_id: envelope.metadata.response_id,
                execution_time_ms,
            },
        })
    }

    async fn project_name(&self, project_id: &ProjectId) -> Option<String> {
        if project_id.is_portfolio() {
            return None;
        }
        match self.directory.find_project(project_id).await {
            Ok(project) => project.map(|project| project.name),
            Err(error) => {
                warn!(
                    event_name = "assistant.project.lookup_failed",
                    project_id = %project_id.0,
                    error = %error,
                    "project name unavailable for prompt"
                );
                None
            }
        }
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_optimized: bool,
        correlation_id: &str,
    ) -> Option<String> {
        let spoken = if voice_optimized { format_for_speech(text) } else { text.to_string() };
        match self.speech.synthesize(&spoken).await {
            Ok(url) => Some(url),
            Err(error) => {
                warn!(
                    event_name = "assistant.voice.failed",
                    correlation_id,
                    error = %error,
                    "speech synthesis failed"
                );
                None
            }
        }
    }
}

/// The configured summary model when its provider is usable, otherwise the
/// cheapest available economy model.
fn summary_model(
    catalog: &ModelCatalog,
    availability: &ProviderAvailability,
    configured: ModelId,
) -> ModelId {
    if availability.is_available(configured.provider()) {
        return configured;
    }
    let available = availability.available_models();
    catalog
        .cheapest_economy(&available)
        .or_else(|| available.first().copied())
        .unwrap_or(configured)
}

fn new_conversation_id() -> String {
    format!("conv_{}", Uuid::new_v4().simple())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
