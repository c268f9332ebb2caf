//! Rolling conversation memory per `(user, project)`.
//!
//! Histories above [`SUMMARIZATION_THRESHOLD_TOKENS`] are compacted into one
//! summary turn followed by a verbatim tail. A failed or timed out summary
//! keeps the full history instead of dropping context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use atlas_core::catalog::ModelId;
use atlas_core::domain::conversation::{history_tokens, ConversationTurn, MemoryKey};
use atlas_core::errors::{ApplicationError, DomainError};
use atlas_db::KeyValueStore;

use crate::llm::{complete_with_timeout, CompletionRequest, ProviderRegistry};

pub const SUMMARIZATION_THRESHOLD_TOKENS: u64 = 15_000;
pub const MIN_RETAINED_TURNS: usize = 4;
const RETAINED_FRACTION: f64 = 0.2;

const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a conversation summarizer. Summarize the \
following conversation history while preserving key context, important details, and the \
overall flow of the conversation. Keep the summary concise but comprehensive enough to \
maintain conversational continuity.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub history: Vec<ConversationTurn>,
    pub total_messages: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreOutcome {
    pub history: Vec<ConversationTurn>,
    pub total_messages: usize,
    pub total_tokens: u64,
    pub was_summarized: bool,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String, ApplicationError>;
}

/// Summaries produced by one configured model.
pub struct LlmSummarizer {
    registry: ProviderRegistry,
    model: ModelId,
    timeout: Duration,
}

impl LlmSummarizer {
    pub fn new(registry: ProviderRegistry, model: ModelId, timeout: Duration) -> Self {
        Self { registry, model, timeout }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String, ApplicationError> {
        let client = self.registry.client_for(self.model.provider()).ok_or_else(|| {
            ApplicationError::Summarization(format!(
                "no client configured for {}",
                self.model.provider()
            ))
        })?;
        let request = CompletionRequest {
            system: SUMMARIZER_SYSTEM_PROMPT.to_string(),
            prompt: format!("Please summarize this conversation history:\n\n{transcript}"),
            temperature: 0.3,
            max_tokens: 1000,
        };
        let completion = complete_with_timeout(client.as_ref(), self.model, &request, self.timeout)
            .await
            .map_err(|error| ApplicationError::Summarization(error.to_string()))?;
        Ok(completion.text)
    }
}

fn decode_history(value: Value) -> Result<Vec<ConversationTurn>, serde_json::Error> {
    serde_json::from_value(value)
}

/// Number of most recent turns kept verbatim when compacting `len` turns.
pub fn retained_tail_len(len: usize) -> usize {
    let fraction = (len as f64 * RETAINED_FRACTION).floor() as usize;
    fraction.max(MIN_RETAINED_TURNS)
}

pub struct MemoryManager {
    store: Arc<dyn KeyValueStore>,
    summarizer: Arc<dyn Summarizer>,
    timeout: Duration,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryManager {
    pub fn new(store: Arc<dyn KeyValueStore>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            store,
            summarizer,
            timeout: Duration::from_secs(30),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn lock_for(&self, storage_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(storage_key.to_string()).or_default().clone()
    }

    /// Drops the caller's handle and forgets the key once no other store
    /// call holds or waits on it.
    fn release_lock(&self, storage_key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(lock);
        if locks.get(storage_key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(storage_key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    async fn load(&self, key: &MemoryKey) -> Result<Option<Value>, ApplicationError> {
        Ok(self.store.get(&key.storage_key()).await?)
    }

    /// Empty history when the stored value does not decode. Read-only callers
    /// only; writers must not replace a record they could not read.
    pub async fn retrieve(&self, key: &MemoryKey) -> Result<MemorySnapshot, ApplicationError> {
        let history = match self.load(key).await? {
            None => Vec::new(),
            Some(value) => match decode_history(value) {
                Ok(history) => history,
                Err(error) => {
                    warn!(
                        event_name = "memory.retrieve.undecodable",
                        memory_key = %key,
                        error = %error,
                        "stored conversation could not be decoded, answering without history"
                    );
                    Vec::new()
                }
            },
        };
        Ok(MemorySnapshot { total_messages: history.len(), history })
    }

    pub async fn store(
        &self,
        key: &MemoryKey,
        user_message: Option<&str>,
        assistant_message: &str,
    ) -> Result<StoreOutcome, ApplicationError> {
        if assistant_message.trim().is_empty() {
            return Err(DomainError::EmptyAssistantMessage.into());
        }

        let storage_key = key.storage_key();
        let lock = self.lock_for(&storage_key);
        let result = {
            let _guard = lock.lock().await;
            self.store_locked(key, &storage_key, user_message, assistant_message).await
        };
        self.release_lock(&storage_key, lock);
        result
    }

    async fn store_locked(
        &self,
        key: &MemoryKey,
        storage_key: &str,
        user_message: Option<&str>,
        assistant_message: &str,
    ) -> Result<StoreOutcome, ApplicationError> {
        let mut history = match self.load(key).await? {
            None => Vec::new(),
            Some(value) => decode_history(value).map_err(|error| {
                warn!(
                    event_name = "memory.store.undecodable",
                    memory_key = %key,
                    error = %error,
                    "stored conversation could not be decoded, leaving it untouched"
                );
                ApplicationError::Persistence(format!(
                    "stored conversation for {key} could not be decoded: {error}"
                ))
            })?,
        };
        if let Some(message) = user_message.filter(|message| !message.trim().is_empty()) {
            history.push(ConversationTurn::user(message));
        }
        history.push(ConversationTurn::assistant(assistant_message));

        let mut was_summarized = false;
        let tokens = history_tokens(&history);
        if tokens > SUMMARIZATION_THRESHOLD_TOKENS {
            let keep = retained_tail_len(history.len());
            if history.len() > keep {
                match self.compact(&history, keep).await {
                    Ok(compacted) => {
                        info!(
                            event_name = "memory.store.summarized",
                            memory_key = %key,
                            tokens_before = tokens,
                            turns_before = history.len(),
                            turns_after = compacted.len(),
                            "conversation summarized"
                        );
                        history = compacted;
                        was_summarized = true;
                    }
                    Err(error) => {
                        warn!(
                            event_name = "memory.store.summarization_failed",
                            memory_key = %key,
                            tokens,
                            error = %error,
                            "summarization failed, keeping full history"
                        );
                    }
                }
            }
        }

        let encoded = serde_json::to_value(&history)
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        self.store.upsert(storage_key, encoded).await?;

        Ok(StoreOutcome {
            total_messages: history.len(),
            total_tokens: history_tokens(&history),
            history,
            was_summarized,
        })
    }

    async fn compact(
        &self,
        history: &[ConversationTurn],
        keep: usize,
    ) -> Result<Vec<ConversationTurn>, ApplicationError> {
        let split = history.len() - keep;
        let transcript = history[..split]
            .iter()
            .map(ConversationTurn::transcript_line)
            .collect::<Vec<_>>()
            .join("\n");

        let summary = tokio::time::timeout(self.timeout, self.summarizer.summarize(&transcript))
            .await
            .map_err(|_| {
                ApplicationError::Summarization(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        let mut compacted = Vec::with_capacity(keep + 1);
        compacted.push(ConversationTurn::summary(summary.trim()));
        compacted.extend_from_slice(&history[split..]);
        Ok(compacted)
    }
}
