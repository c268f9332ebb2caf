//! Keyword intent detection for tool calls.
//!
//! This is a substring heuristic over the lowercased message, not language
//! understanding. It sits behind [`IntentClassifier`] so a structured
//! classifier can replace it without touching execution or approval logic.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde_json::{Map, Value};

use atlas_core::domain::project::{Project, ProjectId};
use atlas_core::domain::tool::ToolName;

const DATA_KEYWORDS: [&str; 15] = [
    "status",
    "budget",
    "spent",
    "cost",
    "progress",
    "completion",
    "safety",
    "quality",
    "how much",
    "what is",
    "show me",
    "portfolio",
    "overview",
    "metrics",
    "data",
];

const SPECIALTIES: [&str; 10] = [
    "electrical",
    "plumbing",
    "hvac",
    "concrete",
    "steel",
    "roofing",
    "carpentry",
    "drywall",
    "painting",
    "landscaping",
];

const COMMUNICATION_APPS: [&str; 7] =
    ["outlook", "teams", "gmail", "email", "calendar", "sms", "slack"];

/// Words too common in project names to identify one on their own.
const GENERIC_NAME_WORDS: [&str; 12] = [
    "building",
    "center",
    "centre",
    "development",
    "residences",
    "project",
    "tower",
    "phase",
    "complex",
    "office",
    "plaza",
    "site",
];

const SCHEDULE_SLIP_DAYS: i64 = 7;

static THOUSANDS_SEPARATOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d),(\d)").expect("THOUSANDS_SEPARATOR_PATTERN regex should compile")
});
static TASK_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btask\s+#?([a-z0-9][a-z0-9_-]*)")
        .expect("TASK_ID_PATTERN regex should compile")
});
static ISO_DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("ISO_DATE_PATTERN regex should compile")
});
static SEND_EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:send|write|draft)\b.*\bemail\b")
        .expect("SEND_EMAIL_PATTERN regex should compile")
});
static SMS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:text|sms)\b").expect("SMS_PATTERN regex should compile")
});
static SCHEDULE_MEETING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bschedule\b.*\bmeeting\b")
        .expect("SCHEDULE_MEETING_PATTERN regex should compile")
});
static POST_TEAMS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:post|message|send)\b.*\bteams\b")
        .expect("POST_TEAMS_PATTERN regex should compile")
});
static OPEN_APP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bopen\s+(?:the\s+|my\s+)?([a-z]+)")
        .expect("OPEN_APP_PATTERN regex should compile")
});
static EMAIL_ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})")
        .expect("EMAIL_ADDRESS_PATTERN regex should compile")
});
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+?\d[\d\s-]{7,}\d)").expect("PHONE_PATTERN regex should compile")
});
static SUBJECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:subject:|about)\s+(.+?)(?:\s+(?:body:|(?:saying|at|on|for)\b)|$)")
        .expect("SUBJECT_PATTERN regex should compile")
});
static BODY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bbody:|\bsaying|\bmessage:|\bthat says)\s*(.+)$")
        .expect("BODY_PATTERN regex should compile")
});
static START_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?)?)")
        .expect("START_TIME_PATTERN regex should compile")
});
static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(minutes|minute|mins|min|hours|hour|hrs|hr)\b")
        .expect("DURATION_PATTERN regex should compile")
});
static CHANNEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:#|\bchannel\s+)([a-z0-9_-]+)")
        .expect("CHANNEL_PATTERN regex should compile")
});

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub tool: ToolName,
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool: ToolName) -> Self {
        Self { tool, parameters: Map::new() }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    fn with_opt(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IntentContext<'a> {
    pub message: &'a str,
    pub project_id: &'a ProjectId,
    pub today: NaiveDate,
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, context: &IntentContext<'_>) -> Vec<ToolCall>;
}

#[derive(Clone, Debug, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, context: &IntentContext<'_>) -> Vec<ToolCall> {
        let message = context.message;
        let lowered = normalize_text(message);
        let has = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));
        let project_id = context.project_id.0.clone();
        let mut calls = Vec::new();

        if has(&DATA_KEYWORDS) || context.project_id.is_portfolio() {
            let call =
                ToolCall::new(ToolName::GetProjectStatus).with("project_id", project_id.clone());
            calls.push(call);
        }

        if has(&["contractor", "vendor"]) {
            let specialty = SPECIALTIES.iter().find(|specialty| lowered.contains(*specialty));
            let call =
                ToolCall::new(ToolName::ListContractors).with_opt("specialty", specialty.copied());
            calls.push(call);
        }

        if has(&["change order", "change request"]) {
            let cost_impact = extract_money_cents(&lowered).map(|cents| cents as f64 / 100.0);
            calls.push(
                ToolCall::new(ToolName::CreateChangeOrder)
                    .with("project_id", project_id.clone())
                    .with("description", message.trim())
                    .with_opt("cost_impact", cost_impact),
            );
        }

        if has(&["reschedule", "delay", "move date"]) {
            let new_date = extract_iso_date(message)
                .unwrap_or_else(|| context.today + Duration::days(SCHEDULE_SLIP_DAYS));
            calls.push(
                ToolCall::new(ToolName::UpdateSchedule)
                    .with("project_id", project_id.clone())
                    .with_opt("task_id", capture(&TASK_ID_PATTERN, message))
                    .with("new_date", new_date.format("%Y-%m-%d").to_string()),
            );
        }

        let sends_email = SEND_EMAIL_PATTERN.is_match(message);
        let sends_sms = SMS_PATTERN.is_match(message);
        let schedules_meeting = SCHEDULE_MEETING_PATTERN.is_match(message);
        let posts_teams = POST_TEAMS_PATTERN.is_match(message);
        let opened_app = capture(&OPEN_APP_PATTERN, message)
            .map(|app| app.to_ascii_lowercase())
            .filter(|app| COMMUNICATION_APPS.contains(&app.as_str()));

        if has(&["communication", "correspondence", "recent messages"]) {
            let call =
                ToolCall::new(ToolName::GetCommunications).with("project_id", project_id.clone());
            calls.push(call);
        }
        if has(&["email", "inbox"]) && !sends_email && opened_app.is_none() {
            calls.push(ToolCall::new(ToolName::GetEmails));
        }
        if lowered.contains("teams") && !posts_teams && opened_app.is_none() {
            calls.push(ToolCall::new(ToolName::GetTeamsMessages));
        }
        if has(&["calendar", "meetings", "upcoming meeting", "agenda"]) && !schedules_meeting {
            calls.push(ToolCall::new(ToolName::GetCalendarEvents));
        }

        if sends_email {
            calls.push(
                ToolCall::new(ToolName::SendEmail)
                    .with_opt("to", capture(&EMAIL_ADDRESS_PATTERN, message))
                    .with_opt("subject", capture(&SUBJECT_PATTERN, message))
                    .with_opt("body", capture(&BODY_PATTERN, message)),
            );
        }
        if sends_sms {
            calls.push(
                ToolCall::new(ToolName::SendSms)
                    .with_opt("to", capture(&PHONE_PATTERN, message))
                    .with_opt("message", capture(&BODY_PATTERN, message)),
            );
        }
        if schedules_meeting {
            let attendees: Vec<Value> = EMAIL_ADDRESS_PATTERN
                .captures_iter(message)
                .filter_map(|captures| captures.get(1))
                .map(|found| Value::String(found.as_str().to_string()))
                .collect();
            calls.push(
                ToolCall::new(ToolName::ScheduleMeeting)
                    .with_opt("attendees", (!attendees.is_empty()).then_some(attendees))
                    .with_opt("subject", capture(&SUBJECT_PATTERN, message))
                    .with_opt("start_time", capture(&START_TIME_PATTERN, message))
                    .with_opt("duration", extract_duration_minutes(message)),
            );
        }
        if posts_teams {
            calls.push(
                ToolCall::new(ToolName::SendTeamsMessage)
                    .with_opt("channel", capture(&CHANNEL_PATTERN, message))
                    .with_opt("message", capture(&BODY_PATTERN, message)),
            );
        }
        if let Some(app) = opened_app {
            calls.push(ToolCall::new(ToolName::OpenCommunicationApp).with("app_name", app));
        }

        calls
    }
}

/// Best match between a message and the directory's project names, scored by
/// how many distinctive name tokens the message contains.
pub fn match_project_name<'a>(message: &str, projects: &'a [Project]) -> Option<&'a Project> {
    let lowered = normalize_text(message);
    let message_tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();

    let mut ranked: Vec<(usize, &Project)> = projects
        .iter()
        .map(|project| {
            let score = distinctive_tokens(&project.name)
                .iter()
                .filter(|token| message_tokens.contains(&token.as_str()))
                .count();
            (score, project)
        })
        .filter(|(score, _)| *score > 0)
        .collect();
    ranked.sort_by(|(left_score, left), (right_score, right)| {
        right_score.cmp(left_score).then_with(|| left.name.cmp(&right.name))
    });
    ranked.first().map(|(_, project)| *project)
}

fn distinctive_tokens(name: &str) -> Vec<String> {
    normalize_text(name)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= 4 && !GENERIC_NAME_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// First dollar amount in the message, in cents. Bare numbers count only
/// after a cost word.
fn extract_money_cents(normalized_text: &str) -> Option<i64> {
    let without_separators = THOUSANDS_SEPARATOR_PATTERN.replace_all(normalized_text, "$1$2");
    let tokens = tokenize(&without_separators);
    let cost_context = ["impact", "cost", "costs", "of", "for", "adds", "add", "budget"];
    for (index, token) in tokens.iter().enumerate() {
        let in_context = index > 0 && cost_context.contains(&tokens[index - 1].as_str());
        if token.starts_with('$') || in_context {
            if let Some(cents) = parse_money_token(token) {
                return Some(cents);
            }
        }
    }
    None
}

fn parse_money_token(token: &str) -> Option<i64> {
    let trimmed = token.trim_start_matches('$').trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = trimmed.strip_suffix('k') {
        (prefix, 1_000.0)
    } else if let Some(prefix) = trimmed.strip_suffix('m') {
        (prefix, 1_000_000.0)
    } else {
        (trimmed, 1.0)
    };

    let amount = number_part.parse::<f64>().ok()?;
    let dollars = amount * multiplier;
    Some((dollars * 100.0).round() as i64)
}

fn extract_iso_date(message: &str) -> Option<NaiveDate> {
    let found = ISO_DATE_PATTERN.find(message)?;
    NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d").ok()
}

fn extract_duration_minutes(message: &str) -> Option<u64> {
    let captures = DURATION_PATTERN.captures(message)?;
    let amount = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();
    Some(if unit.starts_with('h') { amount * 60 } else { amount })
}

fn capture(pattern: &Regex, message: &str) -> Option<String> {
    pattern
        .captures(message)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim().trim_end_matches(['.', '?', '!']).to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    use atlas_core::domain::project::{Project, ProjectId};
    use atlas_core::domain::tool::ToolName;

    use super::{
        extract_money_cents, match_project_name, IntentClassifier, IntentContext,
        KeywordIntentClassifier, ToolCall,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("date")
    }

    fn classify(message: &str, project: &str) -> Vec<ToolCall> {
        let project_id = ProjectId(project.to_string());
        KeywordIntentClassifier::new().classify(&IntentContext {
            message,
            project_id: &project_id,
            today: today(),
        })
    }

    fn tools(calls: &[ToolCall]) -> Vec<ToolName> {
        calls.iter().map(|call| call.tool).collect()
    }

    fn project(id: &str, name: &str) -> Project {
        Project {
            id: ProjectId(id.to_string()),
            name: name.to_string(),
            description: None,
            status: "active".to_string(),
            phase: None,
            total_value: Decimal::ZERO,
            start_date: None,
            end_date: None,
        }
    }

    #[test]
    fn trigger_table() {
        let cases: [(&str, &str, Vec<ToolName>); 8] = [
            ("hello atlas", "proj-1", vec![]),
            ("hello atlas", "portfolio", vec![ToolName::GetProjectStatus]),
            ("How much have we spent?", "proj-1", vec![ToolName::GetProjectStatus]),
            ("find an electrical contractor", "proj-1", vec![ToolName::ListContractors]),
            ("please reschedule task 42", "proj-1", vec![ToolName::UpdateSchedule]),
            ("check my inbox", "proj-1", vec![ToolName::GetEmails]),
            ("open outlook", "proj-1", vec![ToolName::OpenCommunicationApp]),
            ("any upcoming meetings?", "proj-1", vec![ToolName::GetCalendarEvents]),
        ];

        for (message, project, expected) in cases {
            assert_eq!(tools(&classify(message, project)), expected, "message: {message}");
        }
    }

    #[test]
    fn change_order_parses_cost_impact_and_keeps_the_message_as_description() {
        let calls = classify("Create a change order for $12,500 to add a loading dock", "proj-1");
        let call = calls
            .iter()
            .find(|call| call.tool == ToolName::CreateChangeOrder)
            .expect("change order call");

        assert_eq!(call.parameters["project_id"], json!("proj-1"));
        assert_eq!(call.parameters["cost_impact"], json!(12_500.0));
        assert_eq!(
            call.parameters["description"],
            json!("Create a change order for $12,500 to add a loading dock")
        );
    }

    #[test]
    fn change_order_without_an_amount_leaves_cost_impact_missing() {
        let calls = classify("submit a change request for the lobby finishes", "proj-1");
        assert_eq!(tools(&calls), vec![ToolName::CreateChangeOrder]);
        assert!(!calls[0].parameters.contains_key("cost_impact"));
    }

    #[test]
    fn schedule_update_defaults_to_a_week_out() {
        let calls = classify("we need to delay task framing-2", "proj-1");
        assert_eq!(calls[0].parameters["task_id"], json!("framing-2"));
        assert_eq!(calls[0].parameters["new_date"], json!("2026-10-26"));

        let calls = classify("move date for task 7 to 2026-12-01", "proj-1");
        assert_eq!(calls[0].parameters["new_date"], json!("2026-12-01"));
    }

    #[test]
    fn write_triggers_extract_their_parameters() {
        let calls = classify(
            "Send an email to pm@summit.example about rebar delivery saying trucks arrive Monday",
            "proj-1",
        );
        assert_eq!(tools(&calls), vec![ToolName::SendEmail]);
        assert_eq!(calls[0].parameters["to"], json!("pm@summit.example"));
        assert_eq!(calls[0].parameters["subject"], json!("rebar delivery"));
        assert_eq!(calls[0].parameters["body"], json!("trucks arrive Monday"));

        let calls = classify(
            "Schedule a meeting with ana@atlas.example about punch list \
             on 2026-11-03T09:00 for 45 minutes",
            "proj-1",
        );
        assert_eq!(tools(&calls), vec![ToolName::ScheduleMeeting]);
        assert_eq!(calls[0].parameters["attendees"], json!(["ana@atlas.example"]));
        assert_eq!(calls[0].parameters["start_time"], json!("2026-11-03T09:00"));
        assert_eq!(calls[0].parameters["duration"], json!(45));

        let calls =
            classify("Post in the #site-ops Teams channel saying crane inspection passed", "p");
        assert_eq!(tools(&calls), vec![ToolName::SendTeamsMessage]);
        assert_eq!(calls[0].parameters["channel"], json!("site-ops"));
        assert_eq!(calls[0].parameters["message"], json!("crane inspection passed"));
    }

    #[test]
    fn money_tokens_need_a_dollar_sign_or_cost_word() {
        assert_eq!(extract_money_cents("adds $2.5k to the job"), Some(250_000));
        assert_eq!(extract_money_cents("cost impact 1,200"), Some(120_000));
        assert_eq!(extract_money_cents("task 42 moved"), None);
    }

    #[test]
    fn project_names_match_on_distinctive_tokens() {
        let projects = vec![
            project("proj-downtown-office", "Downtown Office Building"),
            project("proj-riverside-medical", "Riverside Medical Center"),
            project("proj-green-valley", "Green Valley Residences"),
        ];

        let matched = match_project_name("What's the budget at Riverside?", &projects);
        assert_eq!(matched.map(|project| project.id.0.as_str()), Some("proj-riverside-medical"));

        let matched = match_project_name("green valley progress", &projects);
        assert_eq!(matched.map(|project| project.id.0.as_str()), Some("proj-green-valley"));

        assert!(match_project_name("status of the office building", &projects).is_none());
    }
}
