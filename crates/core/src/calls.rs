//! Outbound call statistics for the employee directory.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::call::{CallDirection, CallRecord};
use crate::domain::employee::UserId;

pub const DEFAULT_MIN_DURATION_SECS: u64 = 60;
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Which call records count towards a user's total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallStatsPolicy {
    /// Calls must last strictly longer than this.
    pub min_duration_secs: u64,
    pub direction: CallDirection,
}

impl Default for CallStatsPolicy {
    fn default() -> Self {
        Self { min_duration_secs: DEFAULT_MIN_DURATION_SECS, direction: CallDirection::Outbound }
    }
}

impl CallStatsPolicy {
    pub fn qualifies(&self, call: &CallRecord) -> bool {
        call.direction == self.direction && call.duration_secs > self.min_duration_secs
    }
}

/// Reporting window for the statistics query, `[from, to]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl CallWindow {
    pub fn trailing_hours(now: DateTime<Utc>, hours: i64) -> Self {
        Self { from: now - Duration::hours(hours.max(0)), to: now }
    }
}

/// Per-user qualifying call counts. Every user handed to [`aggregate_calls`]
/// has an entry, zero included.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CallStats {
    counts: BTreeMap<UserId, u32>,
    unmatched: u32,
}

impl CallStats {
    pub fn zeroed(users: impl IntoIterator<Item = UserId>) -> Self {
        Self { counts: users.into_iter().map(|id| (id, 0)).collect(), unmatched: 0 }
    }

    pub fn count_for(&self, user: UserId) -> u32 {
        self.counts.get(&user).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<UserId, u32> {
        &self.counts
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Qualifying calls whose user was not among the tracked users.
    pub fn unmatched(&self) -> u32 {
        self.unmatched
    }
}

pub fn aggregate_calls(
    calls: &[CallRecord],
    users: impl IntoIterator<Item = UserId>,
    policy: &CallStatsPolicy,
) -> CallStats {
    let mut stats = CallStats::zeroed(users);

    for call in calls.iter().filter(|call| policy.qualifies(call)) {
        match call.user_id.and_then(|user| stats.counts.get_mut(&user)) {
            Some(count) => *count += 1,
            None => stats.unmatched += 1,
        }
    }

    stats
}
