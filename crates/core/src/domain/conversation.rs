use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tokens::estimate_tokens;

pub const SUMMARY_PREFIX: &str = "[Conversation Summary]: ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_summary: bool,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    pub fn summary(summary_text: &str) -> Self {
        Self {
            role: TurnRole::System,
            content: format!("{SUMMARY_PREFIX}{summary_text}"),
            timestamp: Utc::now(),
            is_summary: true,
        }
    }

    fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), timestamp: Utc::now(), is_summary: false }
    }

    /// `role: content`, the line format handed to the summarizer and the prompt.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.content)
    }
}

/// Estimated tokens over the concatenated contents of `turns`.
pub fn history_tokens(turns: &[ConversationTurn]) -> u64 {
    let joined = turns.iter().map(|turn| turn.content.as_str()).collect::<Vec<_>>().join(" ");
    estimate_tokens(&joined)
}

/// Storage key for one `(user, project)` conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryKey {
    pub user_id: String,
    pub project_id: String,
}

impl MemoryKey {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), project_id: project_id.into() }
    }

    pub fn storage_key(&self) -> String {
        format!("conversation:{}:{}", self.user_id, self.project_id)
    }
}

impl fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{history_tokens, ConversationTurn, MemoryKey, TurnRole};

    #[test]
    fn summary_turn_is_a_flagged_system_turn() {
        let turn = ConversationTurn::summary("budget discussed");
        assert_eq!(turn.role, TurnRole::System);
        assert!(turn.is_summary);
        assert_eq!(turn.content, "[Conversation Summary]: budget discussed");
    }

    #[test]
    fn history_tokens_counts_joined_contents() {
        let turns = vec![ConversationTurn::user("abcd"), ConversationTurn::assistant("efgh")];
        assert_eq!(history_tokens(&turns), 3);
        assert_eq!(history_tokens(&[]), 0);
    }

    #[test]
    fn storage_key_namespaces_user_and_project() {
        let key = MemoryKey::new("u-7", "proj-2");
        assert_eq!(key.storage_key(), "conversation:u-7:proj-2");
        assert_eq!(key.to_string(), "u-7:proj-2");
    }
}
