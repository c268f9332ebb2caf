//! One-shot assistant request from the terminal, printed as the JSON reply
//! envelope the HTTP surface would return.

use atlas_agent::{AssistantRequest, AssistantRuntime, RuntimeStores};
use atlas_core::domain::routing::TaskType;
use serde_json::Value;

use crate::commands::{async_runtime, init_logging, load_config, migrated_pool, CommandResult};

#[derive(Clone, Debug, Default)]
pub struct AskArgs {
    pub message: String,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub task_type: Option<String>,
    pub budget_cents: Option<u64>,
    /// Run side-effecting tools immediately instead of returning them for
    /// approval.
    pub approve: bool,
    pub no_tools: bool,
    /// Raw JSON object forwarded as `context`.
    pub context: Option<String>,
}

impl AskArgs {
    fn into_request(self) -> Result<AssistantRequest, String> {
        let context = match self.context.as_deref() {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value @ Value::Object(_)) => Some(value),
                Ok(_) => return Err("--context must be a JSON object".to_string()),
                Err(error) => return Err(format!("--context is not valid JSON: {error}")),
            },
            None => None,
        };

        Ok(AssistantRequest {
            message: self.message,
            user_id: self.user_id,
            project_id: self.project_id,
            conversation_id: self.conversation_id,
            task_type: self.task_type.map(TaskType::from),
            ai_budget: self.budget_cents,
            context,
            tools_enabled: self.no_tools.then_some(false),
            require_approval: self.approve.then_some(false),
            ..AssistantRequest::default()
        })
    }
}

/// Exit code 0 when the assistant answered, 1 when it replied with an
/// apology; setup failures use the shared command codes.
pub fn run(args: AskArgs) -> CommandResult {
    let request = match args.into_request() {
        Ok(request) => request,
        Err(message) => return CommandResult::failure("ask", "invalid_arguments", message, 2),
    };
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    init_logging(&config);
    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let assistant = AssistantRuntime::from_config(&config, RuntimeStores::sql(pool.clone()))
            .map_err(|error| ("runtime_init", error.to_string(), 3u8))?;
        let outcome = assistant.handle(request).await;
        pool.close().await;
        Ok(outcome)
    });

    let outcome = match result {
        Ok(outcome) => outcome,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("ask", error_class, message, exit_code);
        }
    };

    let exit_code = if outcome.response.success { 0 } else { 1 };
    match serde_json::to_string_pretty(&outcome.response) {
        Ok(output) => CommandResult { exit_code, output },
        Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
    }
}
