//! Response envelope and speech normalization. Nothing in here fails.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::tools::{ToolResult, ToolStatus};

static SENTENCE_END_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([.!?])\s+").expect("SENTENCE_END_PATTERN regex should compile")
});
static COMMA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s+").expect("COMMA_PATTERN regex should compile"));
static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:[.,:]\d+)*\b").expect("NUMBER_PATTERN regex should compile")
});

const CONTRACTIONS: [(&str, &str); 9] = [
    ("won't", "will not"),
    ("Won't", "Will not"),
    ("can't", "cannot"),
    ("Can't", "Cannot"),
    ("n't", " not"),
    ("'ll", " will"),
    ("'re", " are"),
    ("'ve", " have"),
    ("'d", " would"),
];

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] =
    ["", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];

/// Best-effort rewrite of model text for a speech engine: pause markers after
/// sentences and commas, expanded contractions, and whole numbers below 100
/// spelled out.
pub fn format_for_speech(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let paused = SENTENCE_END_PATTERN.replace_all(text, "$1... ");
    let paused = COMMA_PATTERN.replace_all(&paused, ", ... ");

    let mut expanded = paused.replace('\u{2019}', "'");
    for (contraction, expansion) in CONTRACTIONS {
        expanded = expanded.replace(contraction, expansion);
    }

    NUMBER_PATTERN
        .replace_all(&expanded, |captures: &Captures<'_>| {
            let number = &captures[0];
            match number.parse::<u32>() {
                Ok(value) if value < 100 => spell_number(value),
                _ => number.to_string(),
            }
        })
        .into_owned()
}

fn spell_number(value: u32) -> String {
    let value = value as usize;
    if value < ONES.len() {
        return ONES[value].to_string();
    }
    let (tens, ones) = (value / 10, value % 10);
    if ones == 0 {
        TENS[tens].to_string()
    } else {
        format!("{}-{}", TENS[tens], ONES[ones])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_messages: usize,
    pub total_tokens: u64,
    pub was_summarized: bool,
}

pub struct FormatInput<'a> {
    pub text: &'a str,
    pub audio_url: Option<&'a str>,
    /// Raw tool results; entries that do not parse as a tool result are
    /// replaced by an error placeholder.
    pub tool_results: &'a [Value],
    pub memory: Option<MemoryStats>,
    pub is_streaming: bool,
    pub voice_optimized: bool,
    pub conversation_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioInfo {
    pub url: Option<String>,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSummary {
    pub results: Vec<Value>,
    pub pending_approvals: Vec<Value>,
    pub has_results: bool,
    pub has_pending_approvals: bool,
    pub total_executed: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub user_id: String,
    pub response_id: String,
    pub is_streaming: bool,
    pub voice_optimized: bool,
    pub has_audio: bool,
    pub has_tool_results: bool,
    pub has_memory_data: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiHints {
    pub should_play_audio: bool,
    pub show_tool_results: bool,
    pub requires_user_action: bool,
    pub streaming_complete: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub text: String,
    pub original_text: String,
    pub audio: AudioInfo,
    pub tools: ToolSummary,
    pub memory: Option<MemoryStats>,
    pub metadata: ResponseMetadata,
    pub ui: UiHints,
}

pub fn format_response(input: &FormatInput<'_>) -> ResponseEnvelope {
    let results: Vec<Value> = input.tool_results.iter().map(normalize_tool_entry).collect();
    let pending_approvals: Vec<Value> = results
        .iter()
        .filter(|entry| entry.get("requires_approval").and_then(Value::as_bool) == Some(true))
        .cloned()
        .collect();
    let count_status = |status: &str| {
        results
            .iter()
            .filter(|entry| entry.get("status").and_then(Value::as_str) == Some(status))
            .count()
    };

    let text = if input.voice_optimized {
        format_for_speech(input.text)
    } else {
        input.text.to_string()
    };
    let has_audio = input.audio_url.is_some();

    let tools = ToolSummary {
        has_results: !results.is_empty(),
        has_pending_approvals: !pending_approvals.is_empty(),
        total_executed: results.len(),
        successful_executions: count_status("completed"),
        failed_executions: count_status("error"),
        pending_approvals,
        results,
    };

    ResponseEnvelope {
        text,
        original_text: input.text.to_string(),
        audio: AudioInfo { url: input.audio_url.map(str::to_string), available: has_audio },
        metadata: ResponseMetadata {
            timestamp: Utc::now(),
            conversation_id: input.conversation_id.to_string(),
            user_id: input.user_id.to_string(),
            response_id: format!("resp_{}", Uuid::new_v4().simple()),
            is_streaming: input.is_streaming,
            voice_optimized: input.voice_optimized,
            has_audio,
            has_tool_results: tools.has_results,
            has_memory_data: input.memory.is_some(),
        },
        ui: UiHints {
            should_play_audio: has_audio && input.voice_optimized,
            show_tool_results: tools.has_results,
            requires_user_action: tools.has_pending_approvals,
            streaming_complete: !input.is_streaming,
        },
        memory: input.memory,
        tools,
    }
}

/// Serializes tool results for the envelope, degrading any that fail.
pub fn tool_results_to_values(results: &[ToolResult]) -> Vec<Value> {
    results
        .iter()
        .map(|result| {
            serde_json::to_value(result)
                .unwrap_or_else(|error| unknown_tool_entry(&format!("unserializable: {error}")))
        })
        .collect()
}

fn normalize_tool_entry(entry: &Value) -> Value {
    let parsed = match entry {
        Value::String(raw) => serde_json::from_str::<ToolResult>(raw),
        other => serde_json::from_value::<ToolResult>(other.clone()),
    };
    match parsed {
        Ok(result) => serde_json::to_value(&result).unwrap_or_else(|error| {
            unknown_tool_entry(&format!("Failed to parse tool result: {error}"))
        }),
        Err(error) => unknown_tool_entry(&format!("Failed to parse tool result: {error}")),
    }
}

fn unknown_tool_entry(error: &str) -> Value {
    json!({
        "tool_name": "unknown",
        "status": ToolStatus::Error,
        "success": false,
        "requires_approval": false,
        "error": error,
    })
}
