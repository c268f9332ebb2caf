use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of work the caller wants done. Unknown labels map to `General`,
/// which has no entry in the preference table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum TaskType {
    Vision,
    PolicyDoc,
    EmailDraft,
    CodeReview,
    CreativeWriting,
    Translation,
    Summarization,
    #[default]
    Analysis,
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::PolicyDoc => "policy_doc",
            Self::EmailDraft => "email_draft",
            Self::CodeReview => "code_review",
            Self::CreativeWriting => "creative_writing",
            Self::Translation => "translation",
            Self::Summarization => "summarization",
            Self::Analysis => "analysis",
            Self::General => "general",
        }
    }

    pub fn parse_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "vision" => Self::Vision,
            "policy_doc" => Self::PolicyDoc,
            "email_draft" => Self::EmailDraft,
            "code_review" => Self::CodeReview,
            "creative_writing" => Self::CreativeWriting,
            "translation" => Self::Translation,
            "summarization" => Self::Summarization,
            "analysis" => Self::Analysis,
            _ => Self::General,
        }
    }
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        Self::parse_label(&value)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum LatencyRequirement {
    Low,
    #[default]
    Medium,
    High,
}

impl LatencyRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<String> for LatencyRequirement {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LatencyRequirement, TaskType};

    #[test]
    fn task_labels_parse_and_unknown_labels_fall_back_to_general() {
        let parsed: TaskType = serde_json::from_str("\"policy_doc\"").expect("task type");
        assert_eq!(parsed, TaskType::PolicyDoc);

        let unknown: TaskType = serde_json::from_str("\"poetry\"").expect("task type");
        assert_eq!(unknown, TaskType::General);
        assert_eq!(TaskType::default(), TaskType::Analysis);
    }

    #[test]
    fn latency_defaults_to_medium() {
        let parsed: LatencyRequirement = serde_json::from_str("\"LOW\"").expect("latency");
        assert_eq!(parsed, LatencyRequirement::Low);
        assert_eq!(LatencyRequirement::from("fast".to_string()), LatencyRequirement::Medium);
        assert_eq!(
            serde_json::to_string(&LatencyRequirement::High).expect("serialize"),
            "\"high\""
        );
    }
}
