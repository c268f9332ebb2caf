//! Prompt assembly for the assistant model call.

use serde_json::Value;
use tera::{Context, Tera};

use atlas_core::domain::conversation::ConversationTurn;
use atlas_core::domain::project::ProjectId;
use atlas_core::errors::ApplicationError;

/// Line prefix introducing the user's question; always the last section.
pub const QUESTION_MARKER: &str = "USER QUESTION:";

const TEMPLATE_NAME: &str = "assistant.txt.tera";
const RECENT_TURNS: usize = 8;

pub struct PromptInput<'a> {
    pub message: &'a str,
    pub history: &'a [ConversationTurn],
    pub project_id: &'a ProjectId,
    pub project_name: Option<&'a str>,
    /// First tool result of the request, if any.
    pub live_data: Option<&'a Value>,
    pub dashboard_context: Option<&'a Value>,
}

pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, ApplicationError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            TEMPLATE_NAME,
            include_str!("../../../templates/prompts/assistant.txt.tera"),
        )
        .map_err(|error| ApplicationError::Configuration(format!("prompt template: {error}")))?;
        Ok(Self { tera })
    }

    pub fn build(&self, input: &PromptInput<'_>) -> Result<String, ApplicationError> {
        let start = input.history.len().saturating_sub(RECENT_TURNS);
        let history: Vec<String> =
            input.history[start..].iter().map(ConversationTurn::transcript_line).collect();

        let project_line = if input.project_id.is_portfolio() {
            "Portfolio Overview - Multiple Projects".to_string()
        } else {
            format!("Project: {}", input.project_name.unwrap_or("Unknown Project"))
        };

        let mut context = Context::new();
        context.insert("history", &history);
        context.insert("project_line", &project_line);
        context.insert("live_data", &input.live_data.map(pretty).unwrap_or_default());
        context.insert("dashboard_context", &dashboard_section(input.dashboard_context));
        context.insert("question", input.message.trim());

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|error| ApplicationError::Configuration(format!("prompt render: {error}")))
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Caller context minus the tool parameter overrides, or empty when nothing
/// is left to show.
fn dashboard_section(context: Option<&Value>) -> String {
    let Some(Value::Object(fields)) = context else {
        return String::new();
    };
    let mut visible = fields.clone();
    visible.remove("tool_parameters");
    if visible.is_empty() {
        return String::new();
    }
    pretty(&Value::Object(visible))
}
