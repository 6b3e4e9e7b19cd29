//! Fills the telephony log with random outbound calls so the employee page
//! has something to count.

use b24desk_bitrix::fetch::{register_external_call, ExternalCall};
use b24desk_bitrix::BitrixApi;
use b24desk_core::domain::call::CallDirection;
use b24desk_core::domain::employee::UserId;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::commands::{load_config, runtime, webhook_client, CommandResult};

const COMMAND: &str = "generate-test-calls";

/// Generated calls always clear the one-minute threshold.
const MIN_DURATION_SECS: u64 = 61;
const MAX_DURATION_SECS: u64 = 300;
const SPREAD_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub registered: usize,
    pub failures: Vec<String>,
}

pub fn run(count: u32, raw_user_ids: &[String]) -> CommandResult {
    let user_ids = match parse_user_ids(raw_user_ids) {
        Ok(user_ids) => user_ids,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_arguments", message, 2),
    };
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let client = match webhook_client(COMMAND, &config) {
        Ok(client) => client,
        Err(failure) => return failure,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let calls = plan_calls(&mut rand::thread_rng(), count as usize, &user_ids, Utc::now());
    let summary = runtime.block_on(register_all(&client, &calls));

    let mut message = format!(
        "registered {} of {} test calls, {} failed",
        summary.registered,
        calls.len(),
        summary.failures.len()
    );
    for failure in &summary.failures {
        message.push_str("\n  - ");
        message.push_str(failure);
    }

    if summary.registered == 0 && !calls.is_empty() {
        CommandResult::failure(COMMAND, "bitrix_api", message, 4)
    } else {
        CommandResult::success(COMMAND, message)
    }
}

pub fn parse_user_ids(raw: &[String]) -> Result<Vec<UserId>, String> {
    let ids = raw
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| match value.parse::<UserId>() {
            Ok(id) if id.0 > 0 => Ok(id),
            _ => Err(format!("`{value}` is not a user id")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err("--user-ids needs at least one id".to_string());
    }
    Ok(ids)
}

/// Random calls spread over the day before `now`.
pub fn plan_calls(
    rng: &mut impl Rng,
    count: usize,
    user_ids: &[UserId],
    now: DateTime<Utc>,
) -> Vec<ExternalCall> {
    (0..count)
        .filter_map(|index| {
            let user_id = *user_ids.choose(rng)?;
            let started_at = now - Duration::seconds(rng.gen_range(0..SPREAD_SECS));
            Some(ExternalCall {
                user_id,
                phone_number: format!("+7{}", rng.gen_range(9_000_000_000u64..=9_999_999_999)),
                started_at,
                duration_secs: rng.gen_range(MIN_DURATION_SECS..=MAX_DURATION_SECS),
                direction: CallDirection::Outbound,
                call_id: format!("test_call_{}_{}_{index}", user_id.0, started_at.timestamp()),
            })
        })
        .collect()
}

pub async fn register_all(api: &dyn BitrixApi, calls: &[ExternalCall]) -> Summary {
    let mut summary = Summary::default();
    for (position, call) in calls.iter().enumerate() {
        match register_external_call(api, call).await {
            Ok(_) => summary.registered += 1,
            Err(error) => summary.failures.push(format!(
                "[{}/{}] user {}: {}",
                position + 1,
                calls.len(),
                call.user_id.0,
                error.description()
            )),
        }
    }
    summary
}
