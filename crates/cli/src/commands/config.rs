use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use b24desk_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One rendered config entry: dotted key, display value, env names that can set it.
struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Entry {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let bitrix = &config.bitrix;
    vec![
        Entry::new("database.url", &config.database.url, &["B24DESK_DATABASE_URL"]),
        Entry::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["B24DESK_DATABASE_MAX_CONNECTIONS"],
        ),
        Entry::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["B24DESK_DATABASE_TIMEOUT_SECS"],
        ),
        Entry::new(
            "bitrix.portal_domain",
            bitrix.portal_domain.as_deref().unwrap_or("<unset>"),
            &["B24DESK_BITRIX_PORTAL_DOMAIN"],
        ),
        Entry::new("bitrix.app_base_url", &bitrix.app_base_url, &["B24DESK_BITRIX_APP_BASE_URL"]),
        Entry::new(
            "bitrix.client_id",
            bitrix.client_id.as_deref().unwrap_or("<unset>"),
            &["B24DESK_BITRIX_CLIENT_ID"],
        ),
        Entry::new(
            "bitrix.client_secret",
            redact_optional(bitrix.client_secret.as_ref()),
            &["B24DESK_BITRIX_CLIENT_SECRET"],
        ),
        Entry::new(
            "bitrix.webhook_url",
            bitrix
                .webhook_url
                .as_ref()
                .map(|url| redact_webhook(url.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
            &["B24DESK_BITRIX_WEBHOOK_URL"],
        ),
        Entry::new(
            "bitrix.session_secret",
            redact_optional(Some(&bitrix.session_secret)),
            &["B24DESK_BITRIX_SESSION_SECRET"],
        ),
        Entry::new(
            "bitrix.request_timeout_secs",
            bitrix.request_timeout_secs.to_string(),
            &["B24DESK_BITRIX_REQUEST_TIMEOUT_SECS"],
        ),
        Entry::new(
            "deals.custom_field_name",
            &config.deals.custom_field_name,
            &["B24DESK_DEALS_CUSTOM_FIELD_NAME"],
        ),
        Entry::new("deals.default_stage", &config.deals.default_stage, &["B24DESK_DEALS_DEFAULT_STAGE"]),
        Entry::new(
            "deals.default_currency",
            &config.deals.default_currency,
            &["B24DESK_DEALS_DEFAULT_CURRENCY"],
        ),
        Entry::new("deals.recent_limit", config.deals.recent_limit.to_string(), &[]),
        Entry::new(
            "calls.window_hours",
            config.calls.window_hours.to_string(),
            &["B24DESK_CALLS_WINDOW_HOURS"],
        ),
        Entry::new(
            "calls.min_duration_secs",
            config.calls.min_duration_secs.to_string(),
            &["B24DESK_CALLS_MIN_DURATION_SECS"],
        ),
        Entry::new(
            "geocoder.api_key",
            redact_optional(config.geocoder.api_key.as_ref()),
            &["B24DESK_GEOCODER_API_KEY", "YANDEX_API_KEY"],
        ),
        Entry::new("geocoder.base_url", &config.geocoder.base_url, &["B24DESK_GEOCODER_BASE_URL"]),
        Entry::new("geocoder.timeout_secs", config.geocoder.timeout_secs.to_string(), &[]),
        Entry::new(
            "server.bind_address",
            &config.server.bind_address,
            &["B24DESK_SERVER_BIND_ADDRESS"],
        ),
        Entry::new("server.port", config.server.port.to_string(), &["B24DESK_SERVER_PORT"]),
        Entry::new(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["B24DESK_SERVER_HEALTH_CHECK_PORT"],
        ),
        Entry::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &[],
        ),
        Entry::new("server.templates_dir", &config.server.templates_dir, &[]),
        Entry::new("server.static_dir", &config.server.static_dir, &[]),
        Entry::new(
            "logging.level",
            &config.logging.level,
            &["B24DESK_LOGGING_LEVEL", "B24DESK_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["B24DESK_LOGGING_FORMAT", "B24DESK_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("b24desk.toml"), PathBuf::from("config/b24desk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    match secret {
        None => "<unset>".to_string(),
        Some(secret) if secret.expose_secret().trim().is_empty() => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}

/// Keeps the portal host, hides the user id and code after `/rest/`.
fn redact_webhook(url: &str) -> String {
    match url.find("/rest/") {
        Some(index) => format!("{}/rest/***", &url[..index]),
        None => "<redacted>".to_string(),
    }
}
