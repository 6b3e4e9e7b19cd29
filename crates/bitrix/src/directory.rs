use b24desk_core::calls::{aggregate_calls, CallStats, CallStatsPolicy, CallWindow};
use b24desk_core::config::CallsConfig;
use b24desk_core::domain::call::CallDirection;
use b24desk_core::domain::employee::UserId;
use b24desk_core::org::{build_directory, EmployeeRow};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::client::BitrixApi;
use crate::error::BitrixError;
use crate::fetch;

/// Employee directory with manager chains and outbound call counts for the
/// trailing window ending at `now`.
///
/// Users and departments are required. A failed statistics request only zeroes
/// the counts.
pub async fn employee_directory(
    api: &dyn BitrixApi,
    calls: &CallsConfig,
    now: DateTime<Utc>,
) -> Result<Vec<EmployeeRow>, BitrixError> {
    let users = fetch::active_users(api).await?;
    let departments = fetch::departments(api).await?;

    let tracked: Vec<UserId> = users.iter().filter(|user| user.active).map(|user| user.id).collect();
    let policy = CallStatsPolicy {
        min_duration_secs: calls.min_duration_secs,
        direction: CallDirection::Outbound,
    };
    let window = CallWindow::trailing_hours(now, calls.window_hours);

    let stats = match fetch::outbound_calls(api, &window).await {
        Ok(records) => aggregate_calls(&records, tracked, &policy),
        Err(error) => {
            warn!(
                event_name = "employees.call_stats_failed",
                error = %error,
                "call statistics unavailable, showing zero counts"
            );
            CallStats::zeroed(tracked)
        }
    };

    info!(
        event_name = "employees.directory_built",
        users = users.len(),
        departments = departments.len(),
        qualifying_calls = stats.total(),
        unmatched_calls = stats.unmatched(),
        "employee directory built"
    );
    Ok(build_directory(&users, &departments, &stats))
}

#[cfg(test)]
mod tests {
    use b24desk_core::config::CallsConfig;
    use b24desk_core::domain::employee::UserId;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::employee_directory;
    use crate::error::BitrixError;
    use crate::testing::ScriptedApi;

    fn calls_config() -> CallsConfig {
        CallsConfig { window_hours: 24, min_duration_secs: 60 }
    }

    fn org() -> ScriptedApi {
        ScriptedApi::default()
            .with(
                "user.get",
                Ok(json!([
                    {"ID": "1", "NAME": "Ivan", "LAST_NAME": "Petrov", "UF_DEPARTMENT": [10]},
                    {"ID": "2", "NAME": "Olga", "LAST_NAME": "Sidorova", "UF_DEPARTMENT": [10]},
                    {"ID": "3", "NAME": "Pavel", "LAST_NAME": "Orlov", "UF_DEPARTMENT": [11]}
                ])),
            )
            .with(
                "department.get",
                Ok(json!([
                    {"ID": "10", "NAME": "Sales", "UF_HEAD": "2"},
                    {"ID": "11", "NAME": "Support"}
                ])),
            )
    }

    #[tokio::test]
    async fn directory_combines_chains_and_counts() {
        let api = org().with(
            "voximplant.statistic.get",
            Ok(json!([
                {"PORTAL_USER_ID": "1", "CALL_DURATION": "70", "CALL_TYPE": "1"},
                {"PORTAL_USER_ID": "1", "CALL_DURATION": "30", "CALL_TYPE": "1"},
                {"PORTAL_USER_ID": "2", "CALL_DURATION": "90", "CALL_TYPE": "1"}
            ])),
        );
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().expect("timestamp");

        let rows = employee_directory(&api, &calls_config(), now).await.expect("directory");

        let counts: Vec<(UserId, u32)> = rows.iter().map(|row| (row.id, row.calls_count)).collect();
        assert_eq!(counts, vec![(UserId(1), 1), (UserId(2), 1), (UserId(3), 0)]);
        assert_eq!(rows[0].managers, vec!["Sidorova Olga".to_string()]);
        assert!(rows[1].managers.is_empty());
        assert_eq!(rows[2].department, "Support");
    }

    #[tokio::test]
    async fn statistics_failure_degrades_to_zero_counts() {
        let api = org().with(
            "voximplant.statistic.get",
            Err(BitrixError::Api {
                code: "ACCESS_DENIED".to_string(),
                description: "no telephony scope".to_string(),
            }),
        );

        let rows = employee_directory(&api, &calls_config(), Utc::now()).await.expect("directory");

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.calls_count == 0));
    }

    #[tokio::test]
    async fn missing_users_is_an_error() {
        let api = ScriptedApi::default();

        let error = employee_directory(&api, &calls_config(), Utc::now()).await.expect_err("fails");

        assert!(matches!(error, BitrixError::Api { .. }));
    }
}
