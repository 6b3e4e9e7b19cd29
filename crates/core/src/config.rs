use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub bitrix: BitrixConfig,
    pub deals: DealsConfig,
    pub calls: CallsConfig,
    pub geocoder: GeocoderConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BitrixConfig {
    /// Portal host, e.g. `example.bitrix24.ru`. Used when the launch request omits `DOMAIN`.
    pub portal_domain: Option<String>,
    /// Public base URL of this application, used in QR links.
    pub app_base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    /// Incoming webhook (`https://portal/rest/1/xxxx/`) for operator commands.
    pub webhook_url: Option<SecretString>,
    /// HMAC key for the portal session cookie.
    pub session_secret: SecretString,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DealsConfig {
    pub custom_field_name: String,
    pub default_stage: String,
    pub default_currency: String,
    pub recent_limit: usize,
}

#[derive(Clone, Debug)]
pub struct CallsConfig {
    pub window_hours: i64,
    pub min_duration_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
    pub templates_dir: String,
    pub static_dir: String,
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
    pub portal_domain: Option<String>,
    pub app_base_url: Option<String>,
    pub webhook_url: Option<String>,
    pub session_secret: Option<String>,
    pub geocoder_api_key: Option<String>,
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
                url: "sqlite://b24desk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            bitrix: BitrixConfig {
                portal_domain: None,
                app_base_url: "http://127.0.0.1:8000".to_string(),
                client_id: None,
                client_secret: None,
                webhook_url: None,
                session_secret: String::new().into(),
                request_timeout_secs: 30,
            },
            deals: DealsConfig {
                custom_field_name: "UF_CRM_1759500436".to_string(),
                default_stage: "NEW".to_string(),
                default_currency: "RUB".to_string(),
                recent_limit: 10,
            },
            calls: CallsConfig { window_hours: 24, min_duration_secs: 60 },
            geocoder: GeocoderConfig {
                api_key: None,
                base_url: "https://geocode-maps.yandex.ru/1.x/".to_string(),
                timeout_secs: 5,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
                templates_dir: "templates".to_string(),
                static_dir: "static".to_string(),
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
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("b24desk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(bitrix) = patch.bitrix {
            if let Some(portal_domain) = bitrix.portal_domain {
                self.bitrix.portal_domain = Some(portal_domain);
            }
            if let Some(app_base_url) = bitrix.app_base_url {
                self.bitrix.app_base_url = app_base_url;
            }
            if let Some(client_id) = bitrix.client_id {
                self.bitrix.client_id = Some(client_id);
            }
            if let Some(client_secret_value) = bitrix.client_secret {
                self.bitrix.client_secret = Some(secret_value(client_secret_value));
            }
            if let Some(webhook_url_value) = bitrix.webhook_url {
                self.bitrix.webhook_url = Some(secret_value(webhook_url_value));
            }
            if let Some(session_secret_value) = bitrix.session_secret {
                self.bitrix.session_secret = secret_value(session_secret_value);
            }
            if let Some(request_timeout_secs) = bitrix.request_timeout_secs {
                self.bitrix.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(deals) = patch.deals {
            if let Some(custom_field_name) = deals.custom_field_name {
                self.deals.custom_field_name = custom_field_name;
            }
            if let Some(default_stage) = deals.default_stage {
                self.deals.default_stage = default_stage;
            }
            if let Some(default_currency) = deals.default_currency {
                self.deals.default_currency = default_currency;
            }
            if let Some(recent_limit) = deals.recent_limit {
                self.deals.recent_limit = recent_limit;
            }
        }

        if let Some(calls) = patch.calls {
            if let Some(window_hours) = calls.window_hours {
                self.calls.window_hours = window_hours;
            }
            if let Some(min_duration_secs) = calls.min_duration_secs {
                self.calls.min_duration_secs = min_duration_secs;
            }
        }

        if let Some(geocoder) = patch.geocoder {
            if let Some(api_key_value) = geocoder.api_key {
                self.geocoder.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = geocoder.base_url {
                self.geocoder.base_url = base_url;
            }
            if let Some(timeout_secs) = geocoder.timeout_secs {
                self.geocoder.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(templates_dir) = server.templates_dir {
                self.server.templates_dir = templates_dir;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = static_dir;
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
        if let Some(value) = read_env("B24DESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("B24DESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("B24DESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("B24DESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("B24DESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("B24DESK_BITRIX_PORTAL_DOMAIN") {
            self.bitrix.portal_domain = Some(value);
        }
        if let Some(value) = read_env("B24DESK_BITRIX_APP_BASE_URL") {
            self.bitrix.app_base_url = value;
        }
        if let Some(value) = read_env("B24DESK_BITRIX_CLIENT_ID") {
            self.bitrix.client_id = Some(value);
        }
        if let Some(value) = read_env("B24DESK_BITRIX_CLIENT_SECRET") {
            self.bitrix.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("B24DESK_BITRIX_WEBHOOK_URL") {
            self.bitrix.webhook_url = Some(secret_value(value));
        }
        if let Some(value) = read_env("B24DESK_BITRIX_SESSION_SECRET") {
            self.bitrix.session_secret = secret_value(value);
        }
        if let Some(value) = read_env("B24DESK_BITRIX_REQUEST_TIMEOUT_SECS") {
            self.bitrix.request_timeout_secs =
                parse_u64("B24DESK_BITRIX_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("B24DESK_DEALS_CUSTOM_FIELD_NAME") {
            self.deals.custom_field_name = value;
        }
        if let Some(value) = read_env("B24DESK_DEALS_DEFAULT_STAGE") {
            self.deals.default_stage = value;
        }
        if let Some(value) = read_env("B24DESK_DEALS_DEFAULT_CURRENCY") {
            self.deals.default_currency = value;
        }

        if let Some(value) = read_env("B24DESK_CALLS_WINDOW_HOURS") {
            self.calls.window_hours = parse_i64("B24DESK_CALLS_WINDOW_HOURS", &value)?;
        }
        if let Some(value) = read_env("B24DESK_CALLS_MIN_DURATION_SECS") {
            self.calls.min_duration_secs = parse_u64("B24DESK_CALLS_MIN_DURATION_SECS", &value)?;
        }

        let geocoder_key =
            read_env("B24DESK_GEOCODER_API_KEY").or_else(|| read_env("YANDEX_API_KEY"));
        if let Some(value) = geocoder_key {
            self.geocoder.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("B24DESK_GEOCODER_BASE_URL") {
            self.geocoder.base_url = value;
        }

        if let Some(value) = read_env("B24DESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("B24DESK_SERVER_PORT") {
            self.server.port = parse_u16("B24DESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("B24DESK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("B24DESK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("B24DESK_LOGGING_LEVEL").or_else(|| read_env("B24DESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("B24DESK_LOGGING_FORMAT").or_else(|| read_env("B24DESK_LOG_FORMAT"));
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
        if let Some(portal_domain) = overrides.portal_domain {
            self.bitrix.portal_domain = Some(portal_domain);
        }
        if let Some(app_base_url) = overrides.app_base_url {
            self.bitrix.app_base_url = app_base_url;
        }
        if let Some(webhook_url) = overrides.webhook_url {
            self.bitrix.webhook_url = Some(secret_value(webhook_url));
        }
        if let Some(session_secret) = overrides.session_secret {
            self.bitrix.session_secret = secret_value(session_secret);
        }
        if let Some(geocoder_api_key) = overrides.geocoder_api_key {
            self.geocoder.api_key = Some(secret_value(geocoder_api_key));
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_bitrix(&self.bitrix)?;
        validate_deals(&self.deals)?;
        validate_calls(&self.calls)?;
        validate_geocoder(&self.geocoder)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("b24desk.toml"), PathBuf::from("config/b24desk.toml")]
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

fn validate_bitrix(bitrix: &BitrixConfig) -> Result<(), ConfigError> {
    let session_secret = bitrix.session_secret.expose_secret();
    if session_secret.trim().len() < 16 {
        return Err(ConfigError::Validation(
            "bitrix.session_secret is required and must be at least 16 characters".to_string(),
        ));
    }

    if !is_http_url(&bitrix.app_base_url) {
        return Err(ConfigError::Validation(
            "bitrix.app_base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(webhook_url) = &bitrix.webhook_url {
        let webhook_url = webhook_url.expose_secret();
        if !webhook_url.starts_with("https://") || !webhook_url.contains("/rest/") {
            return Err(ConfigError::Validation(
                "bitrix.webhook_url must look like `https://<portal>/rest/<user>/<code>/`"
                    .to_string(),
            ));
        }
    }

    if bitrix.client_id.is_some() != bitrix.client_secret.is_some() {
        return Err(ConfigError::Validation(
            "bitrix.client_id and bitrix.client_secret must be configured together".to_string(),
        ));
    }

    if bitrix.request_timeout_secs == 0 || bitrix.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "bitrix.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_deals(deals: &DealsConfig) -> Result<(), ConfigError> {
    if !deals.custom_field_name.starts_with("UF_CRM_") {
        return Err(ConfigError::Validation(
            "deals.custom_field_name must be a CRM user field (`UF_CRM_...`)".to_string(),
        ));
    }

    if deals.default_stage.trim().is_empty() || deals.default_currency.trim().is_empty() {
        return Err(ConfigError::Validation(
            "deals.default_stage and deals.default_currency must not be empty".to_string(),
        ));
    }

    if deals.recent_limit == 0 || deals.recent_limit > 50 {
        return Err(ConfigError::Validation(
            "deals.recent_limit must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_calls(calls: &CallsConfig) -> Result<(), ConfigError> {
    if calls.window_hours <= 0 || calls.window_hours > 24 * 31 {
        return Err(ConfigError::Validation(
            "calls.window_hours must be in range 1..=744".to_string(),
        ));
    }

    Ok(())
}

fn validate_geocoder(geocoder: &GeocoderConfig) -> Result<(), ConfigError> {
    if !is_http_url(&geocoder.base_url) {
        return Err(ConfigError::Validation(
            "geocoder.base_url must start with http:// or https://".to_string(),
        ));
    }

    if geocoder.timeout_secs == 0 || geocoder.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "geocoder.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 || server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    bitrix: Option<BitrixPatch>,
    deals: Option<DealsPatch>,
    calls: Option<CallsPatch>,
    geocoder: Option<GeocoderPatch>,
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
struct BitrixPatch {
    portal_domain: Option<String>,
    app_base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    webhook_url: Option<String>,
    session_secret: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DealsPatch {
    custom_field_name: Option<String>,
    default_stage: Option<String>,
    default_currency: Option<String>,
    recent_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CallsPatch {
    window_hours: Option<i64>,
    min_duration_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocoderPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    templates_dir: Option<String>,
    static_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
