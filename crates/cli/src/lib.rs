pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::ask::AskArgs;

#[derive(Debug, Parser)]
#[command(
    name = "atlas",
    about = "Atlas construction assistant operator CLI",
    long_about = "Inspect configuration, check readiness, manage the assistant database, and ask \
                  the assistant questions from the terminal.",
    after_help = "Examples:\n  atlas doctor --json\n  atlas seed\n  atlas ask \"How is the \
                  portfolio tracking?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo construction portfolio")]
    Seed {
        #[arg(long, help = "Delete existing demo rows before loading")]
        reset: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, provider credentials, and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send one message to the assistant and print the reply envelope")]
    Ask {
        message: String,
        #[arg(long, help = "Project id; defaults to the portfolio view")]
        project: Option<String>,
        #[arg(long, help = "User id owning the conversation memory")]
        user: Option<String>,
        #[arg(long, help = "Conversation id to continue")]
        conversation: Option<String>,
        #[arg(long = "task-type", help = "Routing task type, e.g. analysis or email_draft")]
        task_type: Option<String>,
        #[arg(long, help = "Daily AI budget in cents")]
        budget: Option<u64>,
        #[arg(long, help = "Execute side-effecting tools without waiting for approval")]
        approve: bool,
        #[arg(long = "no-tools", help = "Skip tool detection")]
        no_tools: bool,
        #[arg(long, help = "JSON object sent as the request context")]
        context: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ask {
            message,
            project,
            user,
            conversation,
            task_type,
            budget,
            approve,
            no_tools,
            context,
        } => commands::ask::run(AskArgs {
            message,
            project_id: project,
            user_id: user,
            conversation_id: conversation,
            task_type,
            budget_cents: budget,
            approve,
            no_tools,
            context,
        }),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
