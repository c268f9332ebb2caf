//! Budget and latency aware model selection with a fixed fallback cascade.
//!
//! Token and cost figures are heuristic (`ceil(chars / 4)` tokens priced by
//! the catalog table). The budget gate is best-effort: two requests can both
//! pass it before either one records its cost, although each increment itself
//! is atomic in the ledger.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use atlas_core::catalog::{
    ModelCatalog, ModelId, Provider, ProviderAvailability, FALLBACK_CASCADE,
};
use atlas_core::domain::routing::{LatencyRequirement, TaskType};
use atlas_core::domain::spend::{Clock, DateKey};
use atlas_core::errors::{ApplicationError, ModelFailure};
use atlas_core::tokens::estimate_tokens;
use atlas_db::SpendLedger;

use crate::llm::{
    complete_with_timeout, Completion, CompletionRequest, LlmClient, LlmError, ProviderRegistry,
};

pub const BUDGET_CONSERVATION_PERCENT: f64 = 80.0;
const MAX_SHARE_OF_REMAINING: f64 = 0.5;
const LOW_LATENCY_SMALL_PROMPT_TOKENS: u64 = 1_000;

const LOW_LATENCY_SMALL: [ModelId; 3] =
    [ModelId::Claude3Haiku, ModelId::Gpt35Turbo, ModelId::Gpt4oMini];
const GENERIC_DEFAULT: [ModelId; 2] = [ModelId::AzureGpt4, ModelId::Gpt4o];

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub prompt: String,
    pub task_type: TaskType,
    pub latency: LatencyRequirement,
    pub daily_budget_cents: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingDecision {
    /// Model picked by the selection rules, before any fallback.
    pub selected: Option<ModelId>,
    pub available: Vec<ModelId>,
    pub spend_before_cents: u64,
    pub budget_conservation: bool,
    pub fallbacks_attempted: Vec<ModelFailure>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteResult {
    pub response_text: String,
    pub model_used: ModelId,
    pub provider: Provider,
    pub token_count: u64,
    pub cost_cents: u64,
    pub budget_used_percent: u32,
    pub decision: RoutingDecision,
}

/// Inputs to the pure selection step.
#[derive(Clone, Copy, Debug)]
pub struct SelectionInput<'a> {
    pub available: &'a [ModelId],
    pub tokens: u64,
    pub task_type: TaskType,
    pub latency: LatencyRequirement,
    pub budget_used_percent: f64,
    pub remaining_cents: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub model: ModelId,
    pub budget_conservation: bool,
}

fn first_available(preferences: &[ModelId], available: &[ModelId]) -> Option<ModelId> {
    preferences.iter().copied().find(|model| available.contains(model))
}

fn task_preferences(task_type: TaskType, tokens: u64) -> &'static [ModelId] {
    use ModelId::*;
    match task_type {
        TaskType::Vision => &[AzureGpt4, Gpt4o, Gpt4oMini],
        TaskType::PolicyDoc => &[AzureGpt4, Claude35Sonnet, Gpt4o],
        TaskType::EmailDraft => &[AzureGpt4, Claude3Haiku, Gpt4oMini],
        TaskType::CodeReview => &[AzureGpt4, Gpt4o, Claude35Sonnet],
        TaskType::CreativeWriting => &[Claude35Sonnet, AzureGpt4, Gpt4o],
        TaskType::Translation => &[Gemini15Pro, AzureGpt4, Gpt4o],
        TaskType::Summarization if tokens > 5_000 => &[AzureGpt4_32k, Claude35Sonnet, Gpt4o],
        TaskType::Summarization => &[AzureGpt4, Claude3Haiku, Gpt4oMini],
        TaskType::Analysis if tokens > 180_000 => &[Gemini15Pro, AzureGpt4_32k, Gpt4o],
        TaskType::Analysis if tokens > 3_000 => &[AzureGpt4_32k, Claude35Sonnet, Gpt4o],
        TaskType::Analysis => &[AzureGpt4, Gpt4o, Gpt4oMini],
        TaskType::General => &[],
    }
}

fn generic_default(available: &[ModelId]) -> Option<ModelId> {
    first_available(&GENERIC_DEFAULT, available).or_else(|| available.first().copied())
}

/// Applies the selection rules in priority order. Returns `None` only when
/// no model is available at all.
pub fn select_model(catalog: &ModelCatalog, input: SelectionInput<'_>) -> Option<Selection> {
    let available = input.available;
    if available.is_empty() {
        return None;
    }

    let conserving = input.budget_used_percent >= BUDGET_CONSERVATION_PERCENT;
    let economy = catalog.cheapest_economy(available);

    let picked = if let (true, Some(model)) = (conserving, economy) {
        model
    } else {
        let low_latency = match input.latency {
            LatencyRequirement::Low if input.tokens < LOW_LATENCY_SMALL_PROMPT_TOKENS => {
                first_available(&LOW_LATENCY_SMALL, available)
                    .or_else(|| first_available(&[ModelId::Gpt4o], available))
            }
            LatencyRequirement::Low => first_available(&[ModelId::Gpt4o], available),
            _ => None,
        };
        match low_latency {
            Some(model) => model,
            None => first_available(task_preferences(input.task_type, input.tokens), available)
                .or_else(|| generic_default(available))?,
        }
    };

    let estimated = catalog.estimate_cost_cents(picked, input.tokens);
    let ceiling = input.remaining_cents as f64 * MAX_SHARE_OF_REMAINING;
    if estimated > ceiling {
        if let Some(model) = economy {
            return Some(Selection { model, budget_conservation: true });
        }
    }

    Some(Selection { model: picked, budget_conservation: conserving && economy == Some(picked) })
}

pub struct LlmRouter {
    catalog: ModelCatalog,
    availability: ProviderAvailability,
    registry: ProviderRegistry,
    ledger: Arc<dyn SpendLedger>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    offline: Option<Arc<dyn LlmClient>>,
}

impl LlmRouter {
    pub fn new(
        catalog: ModelCatalog,
        availability: ProviderAvailability,
        registry: ProviderRegistry,
        ledger: Arc<dyn SpendLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            availability,
            registry,
            ledger,
            clock,
            timeout: Duration::from_secs(30),
            offline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables the labelled offline responder as the last resort.
    pub fn with_offline(mut self, responder: Arc<dyn LlmClient>) -> Self {
        self.offline = Some(responder);
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub async fn route(&self, request: &RouteRequest) -> Result<RouteResult, ApplicationError> {
        let tokens = estimate_tokens(&request.prompt).max(1);
        let day = DateKey::from_date(self.clock.today());
        let spent = self.ledger.spent_on(&day).await?;
        let budget = request.daily_budget_cents;

        if spent >= budget {
            warn!(
                event_name = "llm.route.budget_exceeded",
                date_key = %day,
                spent_cents = spent,
                budget_cents = budget,
                "daily AI budget exhausted, no provider called"
            );
            return Err(ApplicationError::BudgetExceeded {
                spent_cents: spent,
                budget_cents: budget,
            });
        }

        let used_percent = spent as f64 / budget as f64 * 100.0;
        let available = self.availability.available_models();
        let selection = select_model(
            &self.catalog,
            SelectionInput {
                available: &available,
                tokens,
                task_type: request.task_type,
                latency: request.latency,
                budget_used_percent: used_percent,
                remaining_cents: budget - spent,
            },
        );

        let mut decision = RoutingDecision {
            selected: selection.map(|selection| selection.model),
            available: available.clone(),
            spend_before_cents: spent,
            budget_conservation: selection.map(|s| s.budget_conservation).unwrap_or(false),
            fallbacks_attempted: Vec::new(),
        };

        info!(
            event_name = "llm.route.selected",
            selected = decision.selected.map(|model| model.as_str()).unwrap_or("none"),
            task_type = %request.task_type,
            latency = request.latency.as_str(),
            tokens,
            budget_used_percent = used_percent,
            budget_conservation = decision.budget_conservation,
            available_models = available.len(),
            "model selected"
        );

        let (model, completion) = self
            .invoke_with_fallback(decision.selected, &available, request, &mut decision)
            .await?;

        let offline = model == ModelId::Offline;
        let cost = if offline { 0 } else { self.catalog.charge_cents(model, tokens) };
        if !offline {
            match self.ledger.add(&day, cost).await {
                Ok(total) => info!(
                    event_name = "llm.route.spend_recorded",
                    date_key = %day,
                    model = model.as_str(),
                    cost_cents = cost,
                    total_cents = total,
                    "spend recorded"
                ),
                // A failed spend write never discards a completed answer.
                Err(error) => warn!(
                    event_name = "llm.route.spend_record_failed",
                    date_key = %day,
                    model = model.as_str(),
                    cost_cents = cost,
                    error = %error,
                    "spend was not recorded, returning the answer anyway"
                ),
            }
        }

        Ok(RouteResult {
            response_text: completion.text,
            model_used: model,
            provider: completion.provider,
            token_count: tokens,
            cost_cents: cost,
            budget_used_percent: used_percent.round() as u32,
            decision,
        })
    }

    async fn invoke_with_fallback(
        &self,
        selected: Option<ModelId>,
        available: &[ModelId],
        request: &RouteRequest,
        decision: &mut RoutingDecision,
    ) -> Result<(ModelId, Completion), ApplicationError> {
        let completion_request = CompletionRequest::assistant(request.prompt.clone());

        let candidates = selected.into_iter().chain(
            FALLBACK_CASCADE
                .iter()
                .copied()
                .filter(|model| Some(*model) != selected && available.contains(model)),
        );

        for model in candidates {
            match self.attempt(model, &completion_request).await {
                Ok(completion) => return Ok((model, completion)),
                Err(error) => {
                    let message = error.to_string();
                    let failure = error.for_model(model);
                    warn!(
                        event_name = "llm.route.model_failed",
                        model = model.as_str(),
                        provider = %model.provider(),
                        error_class = failure.error_class(),
                        error = %message,
                        "model invocation failed, trying next fallback"
                    );
                    decision
                        .fallbacks_attempted
                        .push(ModelFailure { model: model.as_str().to_string(), message });
                }
            }
        }

        if let Some(offline) = &self.offline {
            warn!(
                event_name = "llm.route.offline_fallback",
                attempts = decision.fallbacks_attempted.len(),
                "no provider answered, using offline responder"
            );
            let completion = complete_with_timeout(
                offline.as_ref(),
                ModelId::Offline,
                &completion_request,
                self.timeout,
            )
            .await
            .map_err(|error| error.for_model(ModelId::Offline))?;
            return Ok((ModelId::Offline, completion));
        }

        Err(ApplicationError::ModelCascadeExhausted {
            attempts: decision.fallbacks_attempted.clone(),
        })
    }

    async fn attempt(
        &self,
        model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let client = self
            .registry
            .client_for(model.provider())
            .ok_or_else(|| LlmError::Unavailable(model.provider().to_string()))?;
        complete_with_timeout(client.as_ref(), model, request, self.timeout).await
    }
}
