use serde::{Deserialize, Serialize};

use crate::domain::employee::UserId;

/// Telephony `CALL_TYPE` classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Outbound,
    Inbound,
    InboundRedirected,
    Callback,
    Unknown,
}

impl CallDirection {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Outbound,
            2 => Self::Inbound,
            3 => Self::InboundRedirected,
            4 => Self::Callback,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> Option<i64> {
        match self {
            Self::Outbound => Some(1),
            Self::Inbound => Some(2),
            Self::InboundRedirected => Some(3),
            Self::Callback => Some(4),
            Self::Unknown => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub user_id: Option<UserId>,
    pub duration_secs: u64,
    pub direction: CallDirection,
}
