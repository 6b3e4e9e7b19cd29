pub mod config;
pub mod doctor;
pub mod migrate;
pub mod org_chart;
pub mod test_calls;

use std::time::Duration;

use b24desk_bitrix::BitrixClient;
use b24desk_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Client for the configured incoming webhook; operator commands never use OAuth.
pub(crate) fn webhook_client(command: &str, config: &AppConfig) -> Result<BitrixClient, CommandResult> {
    let Some(webhook_url) = &config.bitrix.webhook_url else {
        return Err(CommandResult::failure(
            command,
            "webhook_missing",
            "bitrix.webhook_url is not configured (set B24DESK_BITRIX_WEBHOOK_URL)",
            2,
        ));
    };

    let http = BitrixClient::http_client(Duration::from_secs(config.bitrix.request_timeout_secs))
        .map_err(|error| CommandResult::failure(command, "http_client", error.to_string(), 3))?;
    Ok(BitrixClient::for_webhook(http, webhook_url))
}
