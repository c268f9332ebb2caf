use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ModelId;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Provider credentials and routing knobs.
///
/// Credentials are optional; a provider without a usable credential is simply
/// left out of the available model set at routing time.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,
    pub gemini_api_key: Option<SecretString>,
    pub azure_api_key: Option<SecretString>,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: Option<String>,
    pub request_timeout_secs: u64,
    pub offline_fallback: bool,
    pub default_daily_budget_cents: u64,
    pub summary_model: ModelId,
    pub cost_overrides: BTreeMap<ModelId, f64>,
}

#[derive(Clone, Debug)]
pub struct ToolsConfig {
    pub platform_actions_url: Option<String>,
    pub platform_actions_key: Option<SecretString>,
    pub write_enabled: bool,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub offline_fallback: Option<bool>,
    pub default_daily_budget_cents: Option<u64>,
    pub platform_actions_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://atlas.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                openai_api_key: None,
                anthropic_api_key: None,
                gemini_api_key: None,
                azure_api_key: None,
                azure_endpoint: None,
                azure_deployment: None,
                request_timeout_secs: 30,
                offline_fallback: false,
                default_daily_budget_cents: 1_000,
                summary_model: ModelId::Gpt4o,
                cost_overrides: BTreeMap::new(),
            },
            tools: ToolsConfig {
                platform_actions_url: None,
                platform_actions_key: None,
                write_enabled: true,
                request_timeout_secs: 15,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("atlas.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(value) = llm.openai_api_key {
                self.llm.openai_api_key = Some(secret_value(value));
            }
            if let Some(value) = llm.anthropic_api_key {
                self.llm.anthropic_api_key = Some(secret_value(value));
            }
            if let Some(value) = llm.gemini_api_key {
                self.llm.gemini_api_key = Some(secret_value(value));
            }
            if let Some(value) = llm.azure_api_key {
                self.llm.azure_api_key = Some(secret_value(value));
            }
            if let Some(endpoint) = llm.azure_endpoint {
                self.llm.azure_endpoint = Some(endpoint);
            }
            if let Some(deployment) = llm.azure_deployment {
                self.llm.azure_deployment = Some(deployment);
            }
            if let Some(timeout_secs) = llm.request_timeout_secs {
                self.llm.request_timeout_secs = timeout_secs;
            }
            if let Some(offline_fallback) = llm.offline_fallback {
                self.llm.offline_fallback = offline_fallback;
            }
            if let Some(budget) = llm.default_daily_budget_cents {
                self.llm.default_daily_budget_cents = budget;
            }
            if let Some(model) = llm.summary_model {
                self.llm.summary_model = parse_model("llm.summary_model", &model)?;
            }
            if let Some(costs) = llm.costs {
                for (model, cost) in costs {
                    let model_id = parse_model("llm.costs", &model)?;
                    self.llm.cost_overrides.insert(model_id, cost);
                }
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(url) = tools.platform_actions_url {
                self.tools.platform_actions_url = Some(url);
            }
            if let Some(value) = tools.platform_actions_key {
                self.tools.platform_actions_key = Some(secret_value(value));
            }
            if let Some(write_enabled) = tools.write_enabled {
                self.tools.write_enabled = write_enabled;
            }
            if let Some(timeout_secs) = tools.request_timeout_secs {
                self.tools.request_timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ATLAS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ATLAS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ATLAS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ATLAS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ATLAS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let openai_key =
            read_env("ATLAS_LLM_OPENAI_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = openai_key {
            self.llm.openai_api_key = Some(secret_value(value));
        }
        let anthropic_key =
            read_env("ATLAS_LLM_ANTHROPIC_API_KEY").or_else(|| read_env("ANTHROPIC_API_KEY"));
        if let Some(value) = anthropic_key {
            self.llm.anthropic_api_key = Some(secret_value(value));
        }
        let gemini_key = read_env("ATLAS_LLM_GEMINI_API_KEY")
            .or_else(|| read_env("GEMINI_API_KEY"))
            .or_else(|| read_env("GOOGLE_GEMINI_API_KEY"));
        if let Some(value) = gemini_key {
            self.llm.gemini_api_key = Some(secret_value(value));
        }
        let azure_key = read_env("ATLAS_LLM_AZURE_API_KEY").or_else(|| read_env("AZURE_OPENAI_KEY"));
        if let Some(value) = azure_key {
            self.llm.azure_api_key = Some(secret_value(value));
        }
        let azure_endpoint =
            read_env("ATLAS_LLM_AZURE_ENDPOINT").or_else(|| read_env("AZURE_OPENAI_ENDPOINT"));
        if let Some(value) = azure_endpoint {
            self.llm.azure_endpoint = Some(value);
        }
        let azure_deployment = read_env("ATLAS_LLM_AZURE_DEPLOYMENT")
            .or_else(|| read_env("AZURE_OPENAI_DEPLOYMENT_NAME"));
        if let Some(value) = azure_deployment {
            self.llm.azure_deployment = Some(value);
        }
        if let Some(value) = read_env("ATLAS_LLM_REQUEST_TIMEOUT_SECS") {
            self.llm.request_timeout_secs = parse_u64("ATLAS_LLM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ATLAS_LLM_OFFLINE_FALLBACK") {
            self.llm.offline_fallback = parse_bool("ATLAS_LLM_OFFLINE_FALLBACK", &value)?;
        }
        if let Some(value) = read_env("ATLAS_LLM_DEFAULT_DAILY_BUDGET_CENTS") {
            self.llm.default_daily_budget_cents =
                parse_u64("ATLAS_LLM_DEFAULT_DAILY_BUDGET_CENTS", &value)?;
        }
        if let Some(value) = read_env("ATLAS_LLM_SUMMARY_MODEL") {
            self.llm.summary_model =
                value.parse::<ModelId>().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "ATLAS_LLM_SUMMARY_MODEL".to_string(),
                    value,
                })?;
        }

        if let Some(value) = read_env("ATLAS_TOOLS_PLATFORM_ACTIONS_URL") {
            self.tools.platform_actions_url = Some(value);
        }
        if let Some(value) = read_env("ATLAS_TOOLS_PLATFORM_ACTIONS_KEY") {
            self.tools.platform_actions_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ATLAS_TOOLS_WRITE_ENABLED") {
            self.tools.write_enabled = parse_bool("ATLAS_TOOLS_WRITE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ATLAS_TOOLS_REQUEST_TIMEOUT_SECS") {
            self.tools.request_timeout_secs =
                parse_u64("ATLAS_TOOLS_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ATLAS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ATLAS_SERVER_PORT") {
            self.server.port = parse_u16("ATLAS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ATLAS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ATLAS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("ATLAS_LOGGING_LEVEL").or_else(|| read_env("ATLAS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("ATLAS_LOGGING_FORMAT").or_else(|| read_env("ATLAS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(value) = overrides.openai_api_key {
            self.llm.openai_api_key = Some(secret_value(value));
        }
        if let Some(value) = overrides.anthropic_api_key {
            self.llm.anthropic_api_key = Some(secret_value(value));
        }
        if let Some(value) = overrides.gemini_api_key {
            self.llm.gemini_api_key = Some(secret_value(value));
        }
        if let Some(offline_fallback) = overrides.offline_fallback {
            self.llm.offline_fallback = offline_fallback;
        }
        if let Some(budget) = overrides.default_daily_budget_cents {
            self.llm.default_daily_budget_cents = budget;
        }
        if let Some(url) = overrides.platform_actions_url {
            self.tools.platform_actions_url = Some(url);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_tools(&self.tools)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("atlas.toml"), PathBuf::from("config/atlas.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.request_timeout_secs == 0 || llm.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.default_daily_budget_cents == 0 {
        return Err(ConfigError::Validation(
            "llm.default_daily_budget_cents must be greater than zero".to_string(),
        ));
    }

    if let Some((model, _)) =
        llm.cost_overrides.iter().find(|(_, cost)| !cost.is_finite() || **cost < 0.0)
    {
        return Err(ConfigError::Validation(format!(
            "llm.costs.{} must be a non-negative number of cents per 1k tokens",
            model.as_str()
        )));
    }

    if let Some(endpoint) = &llm.azure_endpoint {
        let trimmed = endpoint.trim();
        if !trimmed.is_empty() && !trimmed.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.azure_endpoint must start with https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_tools(tools: &ToolsConfig) -> Result<(), ConfigError> {
    if let Some(url) = &tools.platform_actions_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "tools.platform_actions_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if tools.request_timeout_secs == 0 || tools.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "tools.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let has_key = tools
        .platform_actions_key
        .as_ref()
        .map(|key| !key.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if has_key && tools.platform_actions_url.is_none() {
        return Err(ConfigError::Validation(
            "tools.platform_actions_key is set but tools.platform_actions_url is missing"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_model(field: &str, value: &str) -> Result<ModelId, ConfigError> {
    value
        .parse::<ModelId>()
        .map_err(|_| ConfigError::Validation(format!("{field} references unknown model `{value}`")))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    tools: Option<ToolsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
    gemini_api_key: Option<String>,
    azure_api_key: Option<String>,
    azure_endpoint: Option<String>,
    azure_deployment: Option<String>,
    request_timeout_secs: Option<u64>,
    offline_fallback: Option<bool>,
    default_daily_budget_cents: Option<u64>,
    summary_model: Option<String>,
    costs: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    platform_actions_url: Option<String>,
    platform_actions_key: Option<String>,
    write_enabled: Option<bool>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::catalog::ModelId;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ATLAS_OPENAI_KEY", "sk-test-interpolated-openai-key");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("atlas.toml");
            fs::write(
                &path,
                r#"
[llm]
openai_api_key = "${TEST_ATLAS_OPENAI_KEY}"
summary_model = "claude-3-haiku-20240307"

[llm.costs]
"gpt-4o" = 2.0
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.llm.openai_api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(
                key.as_deref() == Some("sk-test-interpolated-openai-key"),
                "openai key should be interpolated from the environment",
            )?;
            ensure(
                config.llm.summary_model == ModelId::Claude3Haiku,
                "summary model should be parsed from file",
            )?;
            ensure(
                config.llm.cost_overrides.get(&ModelId::Gpt4o) == Some(&2.0),
                "cost override should be keyed by model id",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_ATLAS_OPENAI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATLAS_LOG_LEVEL", "warn");
        env::set_var("ATLAS_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["ATLAS_LOG_LEVEL", "ATLAS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATLAS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ATLAS_LLM_DEFAULT_DAILY_BUDGET_CENTS", "2500");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("atlas.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
default_daily_budget_cents = 500
offline_fallback = true

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.llm.default_daily_budget_cents == 2_500,
                "env budget should win over file and defaults",
            )?;
            ensure(config.llm.offline_fallback, "file should enable offline fallback")?;
            Ok(())
        })();

        clear_vars(&["ATLAS_DATABASE_URL", "ATLAS_LLM_DEFAULT_DAILY_BUDGET_CENTS"]);
        result
    }

    #[test]
    fn conventional_provider_variables_are_lower_precedence_fallbacks() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ANTHROPIC_API_KEY", "sk-ant-REDACTED");
        env::set_var("OPENAI_API_KEY", "sk-conventional-openai-value-000");
        env::set_var("ATLAS_LLM_OPENAI_API_KEY", "sk-prefixed-openai-value-0000000");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            let anthropic =
                config.llm.anthropic_api_key.as_ref().map(|key| key.expose_secret().to_string());
            let openai =
                config.llm.openai_api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(
                anthropic.as_deref() == Some("sk-ant-REDACTED"),
                "conventional anthropic variable should be honoured",
            )?;
            ensure(
                openai.as_deref() == Some("sk-prefixed-openai-value-0000000"),
                "prefixed variable should win over the conventional one",
            )?;
            Ok(())
        })();

        clear_vars(&["ANTHROPIC_API_KEY", "OPENAI_API_KEY", "ATLAS_LLM_OPENAI_API_KEY"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATLAS_TOOLS_PLATFORM_ACTIONS_URL", "ftp://platform.internal");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("tools.platform_actions_url")
            );
            ensure(has_message, "validation failure should mention tools.platform_actions_url")
        })();

        clear_vars(&["ATLAS_TOOLS_PLATFORM_ACTIONS_URL"]);
        result
    }

    #[test]
    fn zero_budget_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                default_daily_budget_cents: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .err()
        .ok_or_else(|| "zero budget should fail validation".to_string())?;

        ensure(
            error.to_string().contains("default_daily_budget_cents"),
            "error should name the budget field",
        )
    }

    #[test]
    fn unknown_summary_model_env_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATLAS_LLM_SUMMARY_MODEL", "gpt-unknown");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "ATLAS_LLM_SUMMARY_MODEL", "override key should be reported")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("unknown model should be rejected".to_string()),
        };

        clear_vars(&["ATLAS_LLM_SUMMARY_MODEL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ATLAS_LLM_GEMINI_API_KEY", "gemini-secret-value-1234567890");
        env::set_var("ATLAS_TOOLS_PLATFORM_ACTIONS_URL", "https://platform.example.com/actions");
        env::set_var("ATLAS_TOOLS_PLATFORM_ACTIONS_KEY", "platform-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("gemini-secret-value-1234567890"),
                "debug output should not contain the gemini key",
            )?;
            ensure(
                !debug.contains("platform-secret-value"),
                "debug output should not contain the platform key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "ATLAS_LLM_GEMINI_API_KEY",
            "ATLAS_TOOLS_PLATFORM_ACTIONS_URL",
            "ATLAS_TOOLS_PLATFORM_ACTIONS_KEY",
        ]);
        result
    }
}
