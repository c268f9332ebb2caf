use std::env;
use std::sync::{Mutex, OnceLock};

use atlas_cli::commands::{ask, config, doctor, migrate, seed};
use serde_json::Value;

const OFFLINE_ENV: &[(&str, &str)] =
    &[("ATLAS_DATABASE_URL", "sqlite::memory:"), ("ATLAS_LLM_OFFLINE_FALLBACK", "true")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(OFFLINE_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_invalid_numbers() {
    with_env(&[("ATLAS_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_demo_portfolio_counts() {
    with_env(OFFLINE_ENV, || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(
            payload["message"],
            "demo portfolio loaded: 4 projects, 4 contractors, 6 communications, 3 meetings"
        );
    });
}

#[test]
fn seed_with_reset_matches_plain_seed() {
    with_env(OFFLINE_ENV, || {
        let first = parse_payload(&seed::run(false).output);
        let second = parse_payload(&seed::run(true).output);

        assert_eq!(first["status"], "ok");
        assert_eq!(first["message"], second["message"]);
    });
}

#[test]
fn config_redacts_keys_and_reports_providers() {
    with_env(&[("ATLAS_LLM_OPENAI_API_KEY", "sk-test-0123456789abcdef0123")], || {
        let output = config::run();

        assert!(output.contains(
            "- llm.openai_api_key = sk-*** (source: env (ATLAS_LLM_OPENAI_API_KEY))"
        ));
        assert!(!output.contains("0123456789abcdef"));
        assert!(output.contains("- openai = available"));
        assert!(output.contains("- anthropic = unavailable"));
    });
}

#[test]
fn doctor_fails_without_providers_or_offline_fallback() {
    with_env(&[("ATLAS_DATABASE_URL", "sqlite::memory:")], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        let providers = find_check(&payload, "model_providers");
        assert_eq!(providers["status"], "fail");
        let database = find_check(&payload, "database_migrations");
        assert_eq!(database["status"], "pass");
    });
}

#[test]
fn doctor_passes_with_offline_fallback() {
    with_env(OFFLINE_ENV, || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(find_check(&payload, "model_providers")["status"], "warn");
    });
}

#[test]
fn ask_prints_the_offline_reply_envelope() {
    with_env(OFFLINE_ENV, || {
        let result = ask::run(ask::AskArgs {
            message: "What should I check on site today?".to_string(),
            user_id: Some("site-lead".to_string()),
            ..ask::AskArgs::default()
        });
        assert_eq!(result.exit_code, 0, "expected an answered request: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["success"], true);
        assert_eq!(payload["model_info"]["model_used"], "atlas-offline");
        assert_eq!(payload["model_info"]["estimated_cost_cents"], 0);
        assert!(payload["conversation_id"].as_str().unwrap_or_default().starts_with("conv_"));
    });
}

#[test]
fn ask_with_empty_message_exits_with_apology() {
    with_env(OFFLINE_ENV, || {
        let result =
            ask::run(ask::AskArgs { message: "  ".to_string(), ..ask::AskArgs::default() });
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["success"], false);
        assert!(payload.get("model_info").is_none());
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn find_check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check should be present")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ATLAS_DATABASE_URL",
        "ATLAS_DATABASE_MAX_CONNECTIONS",
        "ATLAS_DATABASE_TIMEOUT_SECS",
        "ATLAS_LLM_OPENAI_API_KEY",
        "ATLAS_LLM_ANTHROPIC_API_KEY",
        "ATLAS_LLM_GEMINI_API_KEY",
        "ATLAS_LLM_AZURE_API_KEY",
        "ATLAS_LLM_AZURE_ENDPOINT",
        "ATLAS_LLM_AZURE_DEPLOYMENT",
        "ATLAS_LLM_OFFLINE_FALLBACK",
        "ATLAS_LLM_DEFAULT_DAILY_BUDGET_CENTS",
        "ATLAS_LLM_SUMMARY_MODEL",
        "ATLAS_TOOLS_PLATFORM_ACTIONS_URL",
        "ATLAS_TOOLS_PLATFORM_ACTIONS_KEY",
        "ATLAS_TOOLS_WRITE_ENABLED",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "GEMINI_API_KEY",
        "GOOGLE_GEMINI_API_KEY",
        "AZURE_OPENAI_KEY",
        "AZURE_OPENAI_ENDPOINT",
        "AZURE_OPENAI_DEPLOYMENT_NAME",
        "ATLAS_LOGGING_LEVEL",
        "ATLAS_LOGGING_FORMAT",
        "ATLAS_LOG_LEVEL",
        "ATLAS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
