//! Deterministic responder used when no provider can answer and the operator
//! opted into `llm.offline_fallback`.
//!
//! Replies are keyword driven and say plainly that no live model answered.
//! The provider tag is always [`Provider::Offline`].

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use atlas_core::catalog::{ModelId, Provider};
use atlas_core::tokens::estimate_tokens;

use super::{Completion, CompletionRequest, LlmClient, LlmError};
use crate::prompt::QUESTION_MARKER;

#[derive(Clone, Debug, Default)]
pub struct OfflineResponder {
    today: Option<NaiveDate>,
}

impl OfflineResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the date used in date/time replies.
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }

    pub fn reply(&self, prompt: &str) -> String {
        let question = extract_question(prompt);
        let lowered = question.to_lowercase();
        let has = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));

        let first_word =
            lowered.split(|c: char| !c.is_alphanumeric()).find(|word| !word.is_empty());
        let greeting = matches!(first_word, Some("hello" | "hi" | "hey"))
            || has(&["good morning", "good afternoon"]);

        let body = if greeting {
            "Hello, I'm Atlas. I can walk you through project status, budgets, schedules, \
             teams and safety once live models are reachable again."
                .to_string()
        } else if has(&["what day", "what date", "today's date", "what time"]) {
            let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
            format!("Today is {}.", today.format("%A, %B %-d, %Y"))
        } else if has(&["status", "progress", "completion", "overview", "portfolio"]) {
            "The project data retrieved for this request is listed in the tool results. \
             I can't interpret it in detail without a live model."
                .to_string()
        } else if has(&["budget", "cost", "spent", "spend", "money"]) {
            "Budget figures are available in the tool results for this request. \
             Compare budget used against completion to spot overruns."
                .to_string()
        } else if has(&["schedule", "delay", "timeline", "deadline", "reschedule"]) {
            "Schedule questions need a live model for analysis. Check the project timeline \
             in the tool results for current dates and phase."
                .to_string()
        } else if has(&["team", "contractor", "crew", "vendor", "subcontractor"]) {
            "Contractor and team details are listed in the tool results when available."
                .to_string()
        } else if has(&["safety", "incident", "osha", "hazard"]) {
            "Safety scores and incident counts are included in the project data. \
             Review any project with a score below 90 first."
                .to_string()
        } else {
            format!("I received your question: \"{}\".", question.trim())
        };

        format!("[Offline mode: no AI provider answered this request.] {body}")
    }
}

fn extract_question(prompt: &str) -> &str {
    match prompt.rfind(QUESTION_MARKER) {
        Some(index) => {
            let rest = &prompt[index + QUESTION_MARKER.len()..];
            rest.split("\n\n").next().unwrap_or(rest).trim()
        }
        None => prompt.trim(),
    }
}

#[async_trait]
impl LlmClient for OfflineResponder {
    async fn complete(
        &self,
        _model: ModelId,
        request: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let text = self.reply(&request.prompt);
        Ok(Completion {
            total_tokens: Some(estimate_tokens(&text)),
            text,
            vendor_model: ModelId::Offline.as_str().to_string(),
            provider: Provider::Offline,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use atlas_core::catalog::{ModelId, Provider};

    use super::OfflineResponder;
    use crate::llm::{CompletionRequest, LlmClient};
    use crate::prompt::QUESTION_MARKER;

    #[test]
    fn only_the_question_after_the_marker_drives_the_reply() {
        let responder = OfflineResponder::new();
        let prompt = format!("Budget talk in the history.\n\n{QUESTION_MARKER} hello there");
        let reply = responder.reply(&prompt);

        assert!(reply.starts_with("[Offline mode"));
        assert!(reply.contains("I'm Atlas"));
    }

    #[test]
    fn date_questions_use_the_pinned_day() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        let responder = OfflineResponder::with_today(today);
        assert!(responder.reply("what day is it?").contains("Monday, October 19, 2026"));
    }

    #[test]
    fn unmatched_questions_are_echoed() {
        let reply = OfflineResponder::new().reply("Where is the crane parked?");
        assert!(reply.contains("\"Where is the crane parked?\""));
    }

    #[tokio::test]
    async fn completion_is_tagged_offline() {
        let completion = OfflineResponder::new()
            .complete(ModelId::Offline, &CompletionRequest::assistant("safety record?"))
            .await
            .expect("offline never fails");

        assert_eq!(completion.provider, Provider::Offline);
        assert_eq!(completion.vendor_model, "atlas-offline");
        assert!(completion.text.contains("Safety scores"));
    }
}
