use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use henry_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One rendered config entry and the env keys that can set it, in lookup order.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.to_string(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = resolve_config_path(None);
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
    ];
    for field in fields(&config) {
        let source = field_source(&field, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new(
            "slack.app_token",
            redact_token(&config.slack.app_token),
            &["HENRY_SLACK_APP_TOKEN", "SLACK_APP_TOKEN"],
        ),
        Field::new(
            "slack.bot_token",
            redact_token(&config.slack.bot_token),
            &["HENRY_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        ),
        Field::new("slack.api_base_url", &config.slack.api_base_url, &["HENRY_SLACK_API_BASE_URL"]),
        Field::new(
            "slack.signing_secret",
            redact_secret(&config.slack.signing_secret),
            &["HENRY_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
        ),
        Field::new(
            "search.consumer_key",
            redact_secret(&config.search.consumer_key),
            &["HENRY_SEARCH_CONSUMER_KEY", "YELP_CONSUMER_KEY"],
        ),
        Field::new(
            "search.consumer_secret",
            redact_secret(&config.search.consumer_secret),
            &["HENRY_SEARCH_CONSUMER_SECRET", "YELP_CONSUMER_SECRET"],
        ),
        Field::new(
            "search.token",
            redact_secret(&config.search.token),
            &["HENRY_SEARCH_TOKEN", "YELP_TOKEN"],
        ),
        Field::new(
            "search.token_secret",
            redact_secret(&config.search.token_secret),
            &["HENRY_SEARCH_TOKEN_SECRET", "YELP_TOKEN_SECRET"],
        ),
        Field::new("search.base_url", &config.search.base_url, &["HENRY_SEARCH_BASE_URL"]),
        Field::new(
            "search.result_limit",
            config.search.result_limit,
            &["HENRY_SEARCH_RESULT_LIMIT"],
        ),
        Field::new(
            "search.timeout_secs",
            config.search.timeout_secs,
            &["HENRY_SEARCH_TIMEOUT_SECS"],
        ),
        Field::new(
            "maps.api_key",
            redact_secret(&config.maps.api_key),
            &["HENRY_MAPS_API_KEY", "MAPS_API_KEY"],
        ),
        Field::new("maps.base_url", &config.maps.base_url, &["HENRY_MAPS_BASE_URL"]),
        Field::new(
            "maps.size",
            format!("{}x{}", config.maps.width, config.maps.height),
            &[],
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["HENRY_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port, &["HENRY_SERVER_PORT", "PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["HENRY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "conversation.idle_timeout_secs",
            config.conversation.idle_timeout_secs,
            &["HENRY_CONVERSATION_IDLE_TIMEOUT_SECS"],
        ),
        Field::new(
            "conversation.sweep_interval_secs",
            config.conversation.sweep_interval_secs,
            &[],
        ),
        Field::new(
            "conversation.home_address",
            &config.conversation.home_address,
            &["HENRY_CONVERSATION_HOME_ADDRESS"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["HENRY_LOGGING_LEVEL", "HENRY_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["HENRY_LOGGING_FORMAT", "HENRY_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    // `maps.size` is stored as separate width and height keys.
    let file_key = if field.key == "maps.size" { "maps.width" } else { field.key };
    if let Some(doc) = file_doc {
        if contains_path(doc, file_key) {
            let file_path = file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
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

/// Keeps the `xoxb-`/`xapp-` prefix so operators can tell tokens apart.
fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
