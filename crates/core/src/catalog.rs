//! Model catalog, cost table and provider availability.
//!
//! Model identifiers are a closed set. Each one resolves to exactly one
//! provider when it is selected, so adapters never dispatch on string
//! prefixes. Costs are expressed in cents per 1k tokens and are heuristic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    /// Deterministic local responder. Never part of the available set.
    #[serde(rename = "atlas-offline")]
    Offline,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Offline => "atlas-offline",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "azure-gpt-4")]
    AzureGpt4,
    #[serde(rename = "azure-gpt-4-32k")]
    AzureGpt4_32k,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "claude-3-5-sonnet-20241022")]
    Claude35Sonnet,
    #[serde(rename = "claude-3-haiku-20240307")]
    Claude3Haiku,
    #[serde(rename = "claude-3-opus-20240229")]
    Claude3Opus,
    #[serde(rename = "gemini-1.5-pro")]
    Gemini15Pro,
    #[serde(rename = "gemini-1.5-flash")]
    Gemini15Flash,
    #[serde(rename = "atlas-offline")]
    Offline,
}

impl ModelId {
    /// Every routable model, in catalog order.
    pub const ROUTABLE: [ModelId; 11] = [
        ModelId::AzureGpt4,
        ModelId::AzureGpt4_32k,
        ModelId::Gpt4o,
        ModelId::Gpt4oMini,
        ModelId::Gpt4Turbo,
        ModelId::Gpt35Turbo,
        ModelId::Claude35Sonnet,
        ModelId::Claude3Haiku,
        ModelId::Claude3Opus,
        ModelId::Gemini15Pro,
        ModelId::Gemini15Flash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureGpt4 => "azure-gpt-4",
            Self::AzureGpt4_32k => "azure-gpt-4-32k",
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
            Self::Claude35Sonnet => "claude-3-5-sonnet-20241022",
            Self::Claude3Haiku => "claude-3-haiku-20240307",
            Self::Claude3Opus => "claude-3-opus-20240229",
            Self::Gemini15Pro => "gemini-1.5-pro",
            Self::Gemini15Flash => "gemini-1.5-flash",
            Self::Offline => "atlas-offline",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            Self::AzureGpt4 | Self::AzureGpt4_32k => Provider::Azure,
            Self::Gpt4o | Self::Gpt4oMini | Self::Gpt4Turbo | Self::Gpt35Turbo => {
                Provider::OpenAi
            }
            Self::Claude35Sonnet | Self::Claude3Haiku | Self::Claude3Opus => Provider::Anthropic,
            Self::Gemini15Pro | Self::Gemini15Flash => Provider::Google,
            Self::Offline => Provider::Offline,
        }
    }

    /// Name sent on the wire to the vendor API.
    pub fn vendor_model(&self) -> &'static str {
        match self {
            Self::AzureGpt4 => "gpt-4",
            Self::AzureGpt4_32k => "gpt-4-32k",
            other => other.as_str(),
        }
    }

    fn default_cost_per_1k_cents(&self) -> f64 {
        match self {
            Self::AzureGpt4 => 1.5,
            Self::AzureGpt4_32k => 3.0,
            Self::Gpt4o => 1.5,
            Self::Gpt4oMini => 0.15,
            Self::Gpt4Turbo => 1.0,
            Self::Gpt35Turbo => 0.05,
            Self::Claude35Sonnet => 1.5,
            Self::Claude3Haiku => 0.25,
            Self::Claude3Opus => 7.5,
            Self::Gemini15Pro => 1.25,
            Self::Gemini15Flash => 0.075,
            Self::Offline => 0.0,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownModel(pub String);

impl fmt::Display for UnknownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown model `{}`", self.0)
    }
}

impl std::error::Error for UnknownModel {}

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "claude-3-5-sonnet" => return Ok(Self::Claude35Sonnet),
            "claude-3-haiku" => return Ok(Self::Claude3Haiku),
            "claude-3-opus" => return Ok(Self::Claude3Opus),
            _ => {}
        }
        Self::ROUTABLE
            .iter()
            .chain(std::iter::once(&Self::Offline))
            .find(|model| model.as_str() == normalized)
            .copied()
            .ok_or_else(|| UnknownModel(value.to_string()))
    }
}

/// Cheap models used when budget conservation kicks in.
pub const ECONOMY_TIER: [ModelId; 4] =
    [ModelId::Claude3Haiku, ModelId::Gemini15Flash, ModelId::Gpt35Turbo, ModelId::Gpt4oMini];

/// Fixed order tried after the selected model fails.
pub const FALLBACK_CASCADE: [ModelId; 4] =
    [ModelId::Gpt4oMini, ModelId::Gpt35Turbo, ModelId::Claude3Haiku, ModelId::Gemini15Flash];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub provider: Provider,
    pub cost_per_1k_tokens_cents: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    overrides: BTreeMap<ModelId, f64>,
}

impl ModelCatalog {
    pub fn with_overrides(overrides: BTreeMap<ModelId, f64>) -> Self {
        Self { overrides }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::with_overrides(config.cost_overrides.clone())
    }

    pub fn descriptor(&self, model: ModelId) -> ModelDescriptor {
        ModelDescriptor {
            id: model,
            provider: model.provider(),
            cost_per_1k_tokens_cents: self.cost_per_1k_cents(model),
        }
    }

    pub fn cost_per_1k_cents(&self, model: ModelId) -> f64 {
        self.overrides.get(&model).copied().unwrap_or_else(|| model.default_cost_per_1k_cents())
    }

    pub fn estimate_cost_cents(&self, model: ModelId, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k_cents(model)
    }

    /// Cost charged to the daily ledger for a completed call.
    pub fn charge_cents(&self, model: ModelId, tokens: u64) -> u64 {
        let cost = self.estimate_cost_cents(model, tokens).round();
        if cost <= 0.0 {
            0
        } else {
            cost as u64
        }
    }

    /// Cheapest economy model among `available`.
    pub fn cheapest_economy(&self, available: &[ModelId]) -> Option<ModelId> {
        ECONOMY_TIER.iter().copied().filter(|model| available.contains(model)).min_by(|a, b| {
            self.cost_per_1k_cents(*a)
                .partial_cmp(&self.cost_per_1k_cents(*b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

const PLACEHOLDER_MARKERS: [&str; 4] = ["your", "api-key-here", "changeme", "xxx"];

/// A credential is usable when it is present, longer than 20 characters and
/// does not look like a template placeholder.
pub fn credential_is_usable(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.len() <= 20 {
        return false;
    }
    let lowered = trimmed.to_ascii_lowercase();
    !PLACEHOLDER_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn secret_is_usable(secret: Option<&SecretString>) -> bool {
    secret.map(|value| credential_is_usable(value.expose_secret())).unwrap_or(false)
}

fn plain_is_set(value: Option<&str>) -> bool {
    value
        .map(|value| {
            let trimmed = value.trim();
            !trimmed.is_empty() && !trimmed.to_ascii_lowercase().contains("your")
        })
        .unwrap_or(false)
}

/// Which providers have usable credentials. Computed once from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProviderAvailability {
    pub azure: bool,
    pub openai: bool,
    pub anthropic: bool,
    pub google: bool,
}

impl ProviderAvailability {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            azure: secret_is_usable(config.azure_api_key.as_ref())
                && plain_is_set(config.azure_endpoint.as_deref())
                && plain_is_set(config.azure_deployment.as_deref()),
            openai: secret_is_usable(config.openai_api_key.as_ref()),
            anthropic: secret_is_usable(config.anthropic_api_key.as_ref()),
            google: secret_is_usable(config.gemini_api_key.as_ref()),
        }
    }

    pub fn all() -> Self {
        Self { azure: true, openai: true, anthropic: true, google: true }
    }

    pub fn is_available(&self, provider: Provider) -> bool {
        match provider {
            Provider::Azure => self.azure,
            Provider::OpenAi => self.openai,
            Provider::Anthropic => self.anthropic,
            Provider::Google => self.google,
            Provider::Offline => false,
        }
    }

    /// Available models in catalog order.
    pub fn available_models(&self) -> Vec<ModelId> {
        ModelId::ROUTABLE.iter().copied().filter(|model| self.is_available(model.provider())).collect()
    }

    pub fn any(&self) -> bool {
        self.azure || self.openai || self.anthropic || self.google
    }
}
