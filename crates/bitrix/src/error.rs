use b24desk_core::errors::ApplicationError;
use thiserror::Error;

pub const EXPIRED_TOKEN: &str = "expired_token";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BitrixError {
    #[error("bitrix request failed: {0}")]
    Transport(String),
    #[error("bitrix returned HTTP {status}")]
    Status { status: u16 },
    #[error("bitrix api error `{code}`: {description}")]
    Api { code: String, description: String },
    #[error("could not decode bitrix response: {0}")]
    Decode(String),
}

impl BitrixError {
    pub fn is_expired_token(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == EXPIRED_TOKEN)
    }

    /// Portal-provided description, for showing next to a failed row.
    pub fn description(&self) -> String {
        match self {
            Self::Api { description, code } if description.is_empty() => code.clone(),
            Self::Api { description, .. } => description.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BitrixError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<BitrixError> for ApplicationError {
    fn from(error: BitrixError) -> Self {
        if error.is_expired_token() {
            ApplicationError::SessionExpired
        } else {
            ApplicationError::Integration(error.to_string())
        }
    }
}
