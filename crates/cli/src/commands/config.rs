use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use atlas_core::catalog::ProviderAvailability;
use atlas_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct ConfigFile {
    path: PathBuf,
    doc: Value,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let file = detect_config_file();
    let line = |key: &str, value: &str, env_keys: &[&str]| {
        format!("- {key} = {value} (source: {})", field_source(key, env_keys, file.as_ref()))
    };

    let llm = &config.llm;
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend([
        line("database.url", &config.database.url, &["ATLAS_DATABASE_URL"]),
        line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            &["ATLAS_DATABASE_MAX_CONNECTIONS"],
        ),
        line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            &["ATLAS_DATABASE_TIMEOUT_SECS"],
        ),
        line(
            "llm.openai_api_key",
            &redact_secret(llm.openai_api_key.as_ref()),
            &["ATLAS_LLM_OPENAI_API_KEY", "OPENAI_API_KEY"],
        ),
        line(
            "llm.anthropic_api_key",
            &redact_secret(llm.anthropic_api_key.as_ref()),
            &["ATLAS_LLM_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"],
        ),
        line(
            "llm.gemini_api_key",
            &redact_secret(llm.gemini_api_key.as_ref()),
            &["ATLAS_LLM_GEMINI_API_KEY", "GEMINI_API_KEY", "GOOGLE_GEMINI_API_KEY"],
        ),
        line(
            "llm.azure_api_key",
            &redact_secret(llm.azure_api_key.as_ref()),
            &["ATLAS_LLM_AZURE_API_KEY", "AZURE_OPENAI_KEY"],
        ),
        line(
            "llm.azure_endpoint",
            llm.azure_endpoint.as_deref().unwrap_or("<unset>"),
            &["ATLAS_LLM_AZURE_ENDPOINT", "AZURE_OPENAI_ENDPOINT"],
        ),
        line(
            "llm.azure_deployment",
            llm.azure_deployment.as_deref().unwrap_or("<unset>"),
            &["ATLAS_LLM_AZURE_DEPLOYMENT", "AZURE_OPENAI_DEPLOYMENT_NAME"],
        ),
        line(
            "llm.request_timeout_secs",
            &llm.request_timeout_secs.to_string(),
            &["ATLAS_LLM_REQUEST_TIMEOUT_SECS"],
        ),
        line(
            "llm.offline_fallback",
            &llm.offline_fallback.to_string(),
            &["ATLAS_LLM_OFFLINE_FALLBACK"],
        ),
        line(
            "llm.default_daily_budget_cents",
            &llm.default_daily_budget_cents.to_string(),
            &["ATLAS_LLM_DEFAULT_DAILY_BUDGET_CENTS"],
        ),
        line("llm.summary_model", llm.summary_model.as_str(), &["ATLAS_LLM_SUMMARY_MODEL"]),
        line(
            "tools.platform_actions_url",
            config.tools.platform_actions_url.as_deref().unwrap_or("<unset>"),
            &["ATLAS_TOOLS_PLATFORM_ACTIONS_URL"],
        ),
        line(
            "tools.platform_actions_key",
            &redact_secret(config.tools.platform_actions_key.as_ref()),
            &["ATLAS_TOOLS_PLATFORM_ACTIONS_KEY"],
        ),
        line(
            "tools.write_enabled",
            &config.tools.write_enabled.to_string(),
            &["ATLAS_TOOLS_WRITE_ENABLED"],
        ),
        line("server.bind_address", &config.server.bind_address, &["ATLAS_SERVER_BIND_ADDRESS"]),
        line("server.port", &config.server.port.to_string(), &["ATLAS_SERVER_PORT"]),
        line(
            "logging.level",
            &config.logging.level,
            &["ATLAS_LOGGING_LEVEL", "ATLAS_LOG_LEVEL"],
        ),
        line(
            "logging.format",
            &format!("{:?}", config.logging.format).to_lowercase(),
            &["ATLAS_LOGGING_FORMAT", "ATLAS_LOG_FORMAT"],
        ),
    ]);

    let availability = ProviderAvailability::from_config(llm);
    lines.push("provider availability:".to_string());
    for (provider, available) in [
        ("azure", availability.azure),
        ("openai", availability.openai),
        ("anthropic", availability.anthropic),
        ("google", availability.google),
    ] {
        let state = if available { "available" } else { "unavailable" };
        lines.push(format!("- {provider} = {state}"));
    }

    lines.join("\n")
}

fn detect_config_file() -> Option<ConfigFile> {
    let path = [PathBuf::from("atlas.toml"), PathBuf::from("config/atlas.toml")]
        .into_iter()
        .find(|path| path.exists())?;
    let doc = fs::read_to_string(&path).ok()?.parse::<Value>().ok()?;
    Some(ConfigFile { path, doc })
}

fn field_source(key_path: &str, env_keys: &[&str], file: Option<&ConfigFile>) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    match file {
        Some(file) if contains_path(&file.doc, key_path) => {
            format!("file ({})", file.path.display())
        }
        _ => "default".to_string(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps at most a short prefix such as `sk-` so operators can tell keys
/// apart without exposing them.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_a_short_prefix() {
        let key = SecretString::from("sk-live-0123456789abcdef".to_string());
        let opaque = SecretString::from("0123456789abcdef".to_string());

        assert_eq!(redact_secret(Some(&key)), "sk-***");
        assert_eq!(redact_secret(Some(&opaque)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[llm]\noffline_fallback = true\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.offline_fallback"));
        assert!(!contains_path(&doc, "llm.summary_model"));
    }
}
