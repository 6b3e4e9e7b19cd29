use b24desk_bitrix::{employee_directory, BitrixApi, BitrixError};
use b24desk_core::config::CallsConfig;
use chrono::{DateTime, Utc};

use crate::commands::{load_config, runtime, webhook_client, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("org-chart") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let client = match webhook_client("org-chart", &config) {
        Ok(client) => client,
        Err(failure) => return failure,
    };
    let runtime = match runtime("org-chart") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(render(&client, &config.calls, Utc::now())) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("org-chart", "bitrix_api", error.description(), 4),
    }
}

/// Pretty JSON array of directory rows.
pub async fn render(
    api: &dyn BitrixApi,
    calls: &CallsConfig,
    now: DateTime<Utc>,
) -> Result<String, BitrixError> {
    let rows = employee_directory(api, calls, now).await?;
    serde_json::to_string_pretty(&rows).map_err(|error| BitrixError::Decode(error.to_string()))
}
