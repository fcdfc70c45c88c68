use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "henry.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub search: SearchConfig,
    pub maps: MapsConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub api_base_url: String,
    /// Verifies Events API deliveries; empty keeps `/slack/events` unmounted.
    pub signing_secret: SecretString,
}

impl SlackConfig {
    pub fn events_enabled(&self) -> bool {
        !self.signing_secret.expose_secret().trim().is_empty()
    }
}

/// Yelp v2 OAuth 1.0a credentials plus request tuning.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub token: SecretString,
    pub token_secret: SecretString,
    pub base_url: String,
    pub result_limit: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MapsConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    /// Zero disables idle expiry.
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub home_address: String,
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
    pub log_level: Option<String>,
    pub port: Option<u16>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub search_base_url: Option<String>,
    pub maps_base_url: Option<String>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    /// Local console runs have no Slack workspace to talk to.
    pub skip_slack_validation: bool,
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
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
                signing_secret: String::new().into(),
            },
            search: SearchConfig {
                consumer_key: String::new().into(),
                consumer_secret: String::new().into(),
                token: String::new().into(),
                token_secret: String::new().into(),
                base_url: "https://api.yelp.com".to_string(),
                result_limit: 2,
                timeout_secs: 10,
            },
            maps: MapsConfig {
                api_key: String::new().into(),
                base_url: "https://maps.googleapis.com".to_string(),
                width: 600,
                height: 300,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3001,
                graceful_shutdown_secs: 15,
            },
            conversation: ConversationConfig {
                idle_timeout_secs: 900,
                sweep_interval_secs: 60,
                home_address: "1 Infinite Loop, Cupertino, CA".to_string(),
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

impl ConversationConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        if options.skip_slack_validation {
            config.validate_without_slack()?;
        } else {
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(value) = slack.app_token {
                self.slack.app_token = secret_value(value);
            }
            if let Some(value) = slack.bot_token {
                self.slack.bot_token = secret_value(value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(value) = slack.signing_secret {
                self.slack.signing_secret = secret_value(value);
            }
        }

        if let Some(search) = patch.search {
            if let Some(value) = search.consumer_key {
                self.search.consumer_key = secret_value(value);
            }
            if let Some(value) = search.consumer_secret {
                self.search.consumer_secret = secret_value(value);
            }
            if let Some(value) = search.token {
                self.search.token = secret_value(value);
            }
            if let Some(value) = search.token_secret {
                self.search.token_secret = secret_value(value);
            }
            if let Some(base_url) = search.base_url {
                self.search.base_url = base_url;
            }
            if let Some(result_limit) = search.result_limit {
                self.search.result_limit = result_limit;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(maps) = patch.maps {
            if let Some(value) = maps.api_key {
                self.maps.api_key = secret_value(value);
            }
            if let Some(base_url) = maps.base_url {
                self.maps.base_url = base_url;
            }
            if let Some(width) = maps.width {
                self.maps.width = width;
            }
            if let Some(height) = maps.height {
                self.maps.height = height;
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

        if let Some(conversation) = patch.conversation {
            if let Some(idle_timeout_secs) = conversation.idle_timeout_secs {
                self.conversation.idle_timeout_secs = idle_timeout_secs;
            }
            if let Some(sweep_interval_secs) = conversation.sweep_interval_secs {
                self.conversation.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(home_address) = conversation.home_address {
                self.conversation.home_address = home_address;
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_or("HENRY_SLACK_APP_TOKEN", "SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env_or("HENRY_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("HENRY_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env_or("HENRY_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }

        if let Some(value) = read_env_or("HENRY_SEARCH_CONSUMER_KEY", "YELP_CONSUMER_KEY") {
            self.search.consumer_key = secret_value(value);
        }
        if let Some(value) = read_env_or("HENRY_SEARCH_CONSUMER_SECRET", "YELP_CONSUMER_SECRET") {
            self.search.consumer_secret = secret_value(value);
        }
        if let Some(value) = read_env_or("HENRY_SEARCH_TOKEN", "YELP_TOKEN") {
            self.search.token = secret_value(value);
        }
        if let Some(value) = read_env_or("HENRY_SEARCH_TOKEN_SECRET", "YELP_TOKEN_SECRET") {
            self.search.token_secret = secret_value(value);
        }
        if let Some(value) = read_env("HENRY_SEARCH_BASE_URL") {
            self.search.base_url = value;
        }
        if let Some(value) = read_env("HENRY_SEARCH_RESULT_LIMIT") {
            self.search.result_limit = parse_u32("HENRY_SEARCH_RESULT_LIMIT", &value)?;
        }
        if let Some(value) = read_env("HENRY_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("HENRY_SEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env_or("HENRY_MAPS_API_KEY", "MAPS_API_KEY") {
            self.maps.api_key = secret_value(value);
        }
        if let Some(value) = read_env("HENRY_MAPS_BASE_URL") {
            self.maps.base_url = value;
        }

        if let Some(value) = read_env("HENRY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HENRY_SERVER_PORT") {
            self.server.port = parse_u16("HENRY_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("HENRY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HENRY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("HENRY_CONVERSATION_IDLE_TIMEOUT_SECS") {
            self.conversation.idle_timeout_secs =
                parse_u64("HENRY_CONVERSATION_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HENRY_CONVERSATION_HOME_ADDRESS") {
            self.conversation.home_address = value;
        }

        let log_level = read_env("HENRY_LOGGING_LEVEL").or_else(|| read_env("HENRY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("HENRY_LOGGING_FORMAT").or_else(|| read_env("HENRY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(search_base_url) = overrides.search_base_url {
            self.search.base_url = search_base_url;
        }
        if let Some(maps_base_url) = overrides.maps_base_url {
            self.maps.base_url = maps_base_url;
        }
        if let Some(idle_timeout_secs) = overrides.idle_timeout_secs {
            self.conversation.idle_timeout_secs = idle_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        self.validate_without_slack()
    }

    pub fn validate_without_slack(&self) -> Result<(), ConfigError> {
        validate_search(&self.search)?;
        validate_maps(&self.maps)?;
        validate_server(&self.server)?;
        validate_conversation(&self.conversation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/henry.toml")]
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required (SLACK_APP_TOKEN). Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required (SLACK_BOT_TOKEN). Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    let credentials = [
        ("search.consumer_key", "YELP_CONSUMER_KEY", &search.consumer_key),
        ("search.consumer_secret", "YELP_CONSUMER_SECRET", &search.consumer_secret),
        ("search.token", "YELP_TOKEN", &search.token),
        ("search.token_secret", "YELP_TOKEN_SECRET", &search.token_secret),
    ];
    for (field, env_key, value) in credentials {
        if value.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field} is required ({env_key}). Get it from https://www.yelp.com/developers/v2/manage_api_keys"
            )));
        }
    }

    validate_http_url("search.base_url", &search.base_url)?;

    if search.result_limit == 0 || search.result_limit > 20 {
        return Err(ConfigError::Validation(
            "search.result_limit must be in range 1..=20".to_string(),
        ));
    }

    if search.timeout_secs == 0 || search.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_maps(maps: &MapsConfig) -> Result<(), ConfigError> {
    if maps.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "maps.api_key is required (MAPS_API_KEY)".to_string(),
        ));
    }

    validate_http_url("maps.base_url", &maps.base_url)?;

    if maps.width == 0 || maps.height == 0 || maps.width > 640 || maps.height > 640 {
        return Err(ConfigError::Validation(
            "maps.width and maps.height must be in range 1..=640".to_string(),
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

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    if conversation.home_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "conversation.home_address must not be empty".to_string(),
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

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Prefixed key first, then the bare name deployments already export.
fn read_env_or(key: &str, fallback: &str) -> Option<String> {
    read_env(key).or_else(|| read_env(fallback))
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    search: Option<SearchPatch>,
    maps: Option<MapsPatch>,
    server: Option<ServerPatch>,
    conversation: Option<ConversationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    api_base_url: Option<String>,
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    token: Option<String>,
    token_secret: Option<String>,
    base_url: Option<String>,
    result_limit: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MapsPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    idle_timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    home_address: Option<String>,
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
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const CREDENTIAL_VARS: [(&str, &str); 7] = [
        ("HENRY_SLACK_APP_TOKEN", "xapp-test"),
        ("HENRY_SLACK_BOT_TOKEN", "xoxb-test"),
        ("HENRY_SEARCH_CONSUMER_KEY", "consumer-key"),
        ("HENRY_SEARCH_CONSUMER_SECRET", "consumer-secret"),
        ("HENRY_SEARCH_TOKEN", "token"),
        ("HENRY_SEARCH_TOKEN_SECRET", "token-secret"),
        ("HENRY_MAPS_API_KEY", "maps-key"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_credentials() {
        for (key, value) in CREDENTIAL_VARS {
            env::set_var(key, value);
        }
    }

    fn clear_credentials() {
        for (key, _) in CREDENTIAL_VARS {
            env::remove_var(key);
        }
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

        set_credentials();
        env::set_var("TEST_YELP_KEY", "key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("henry.toml");
            fs::write(
                &path,
                r#"
[search]
consumer_key = "${TEST_YELP_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            clear_vars(&["HENRY_SEARCH_CONSUMER_KEY"]);
            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.search.consumer_key.expose_secret() == "key-from-env",
                "consumer key should be interpolated from environment",
            )
        })();

        clear_credentials();
        clear_vars(&["TEST_YELP_KEY"]);
        result
    }

    #[test]
    fn unprefixed_credential_names_are_accepted() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        clear_vars(&["HENRY_SLACK_BOT_TOKEN", "HENRY_MAPS_API_KEY"]);
        env::set_var("SLACK_BOT_TOKEN", "xoxb-bare");
        env::set_var("MAPS_API_KEY", "bare-maps-key");
        env::set_var("PORT", "4100");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.bot_token.expose_secret() == "xoxb-bare",
                "bare SLACK_BOT_TOKEN should be used",
            )?;
            ensure(
                config.maps.api_key.expose_secret() == "bare-maps-key",
                "bare MAPS_API_KEY should be used",
            )?;
            ensure(config.server.port == 4100, "PORT should set the server port")
        })();

        clear_credentials();
        clear_vars(&["SLACK_BOT_TOKEN", "MAPS_API_KEY", "PORT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("HENRY_SEARCH_BASE_URL", "http://search-from-env.test");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("henry.toml");
            fs::write(
                &path,
                r#"
[search]
base_url = "http://search-from-file.test"
result_limit = 5

[server]
port = 9000

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    port: Some(9100),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.port == 9100, "override port should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.search.base_url == "http://search-from-env.test",
                "env search url should win over file",
            )?;
            ensure(config.search.result_limit == 5, "file result limit should win over default")?;
            ensure(config.maps.width == 600, "default map width should survive")
        })();

        clear_credentials();
        clear_vars(&["HENRY_SEARCH_BASE_URL"]);
        result
    }

    #[test]
    fn missing_yelp_credential_fails_fast() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        clear_vars(&["HENRY_SEARCH_TOKEN_SECRET", "YELP_TOKEN_SECRET"]);

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("YELP_TOKEN_SECRET")
            );
            ensure(has_message, "validation failure should name YELP_TOKEN_SECRET")
        })();

        clear_credentials();
        result
    }

    #[test]
    fn swapped_slack_tokens_get_a_hint() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("HENRY_SLACK_APP_TOKEN", "xoxb-wrong-one");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_hint = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("bot token instead")
            );
            ensure(has_hint, "validation failure should hint at swapped tokens")
        })();

        clear_credentials();
        result
    }

    #[test]
    fn console_runs_skip_slack_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        clear_vars(&["HENRY_SLACK_APP_TOKEN", "HENRY_SLACK_BOT_TOKEN"]);

        let result = (|| -> Result<(), String> {
            AppConfig::load(LoadOptions { skip_slack_validation: true, ..LoadOptions::default() })
                .map(|_| ())
                .map_err(|err| format!("config load failed: {err}"))
        })();

        clear_credentials();
        result
    }

    #[test]
    fn signing_secret_enables_events_endpoint() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(!config.slack.events_enabled(), "events stay off without a signing secret")?;

            env::set_var("SLACK_SIGNING_SECRET", "8f742231b10e8888abcd99yyyzzz85a5");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.slack.events_enabled(), "signing secret should enable events")?;
            ensure(
                config.slack.signing_secret.expose_secret() == "8f742231b10e8888abcd99yyyzzz85a5",
                "signing secret should come from SLACK_SIGNING_SECRET",
            )
        })();

        clear_credentials();
        clear_vars(&["SLACK_SIGNING_SECRET"]);
        result
    }

    #[test]
    fn invalid_numeric_env_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("HENRY_SERVER_PORT", "not-a-port");

        let result = (|| -> Result<(), String> {
            let failed = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "HENRY_SERVER_PORT"
            );
            ensure(failed, "bad port should be rejected with its key")
        })();

        clear_credentials();
        clear_vars(&["HENRY_SERVER_PORT"]);
        result
    }

    #[test]
    fn zero_idle_timeout_disables_expiry() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    idle_timeout_secs: Some(0),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.conversation.idle_timeout().is_none(), "zero should disable expiry")?;

            let defaults = AppConfig::default();
            ensure(
                defaults.conversation.idle_timeout() == Some(Duration::from_secs(900)),
                "default idle timeout should be fifteen minutes",
            )
        })();

        clear_credentials();
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials();
        env::set_var("HENRY_SEARCH_TOKEN_SECRET", "yelp-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("xoxb-test"), "debug output should not contain bot token")?;
            ensure(
                !debug.contains("yelp-secret-value"),
                "debug output should not contain yelp secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_credentials();
        result
    }
}
