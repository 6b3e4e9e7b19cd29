use async_trait::async_trait;
use b24desk_core::geo::Coordinates;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Transport(String),
    #[error("geocoder returned HTTP {0}")]
    Status(u16),
    #[error("could not decode geocoder response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for a free-form address; `Ok(None)` when nothing matched.
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

pub struct YandexGeocoder {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl YandexGeocoder {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { http, base_url: base_url.into(), api_key }
    }
}

#[async_trait]
impl Geocoder for YandexGeocoder {
    async fn locate(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("apikey", self.api_key.expose_secret()),
                ("geocode", address),
                ("format", "json"),
                ("results", "1"),
            ])
            .send()
            .await
            .map_err(|error| GeocodeError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body: Value =
            response.json().await.map_err(|error| GeocodeError::Decode(error.to_string()))?;
        first_position(&body)
    }
}

fn first_position(body: &Value) -> Result<Option<Coordinates>, GeocodeError> {
    let members = body
        .pointer("/response/GeoObjectCollection/featureMember")
        .and_then(Value::as_array)
        .ok_or_else(|| GeocodeError::Decode("missing featureMember".to_string()))?;

    let Some(first) = members.first() else {
        return Ok(None);
    };
    let pos = first
        .pointer("/GeoObject/Point/pos")
        .and_then(Value::as_str)
        .ok_or_else(|| GeocodeError::Decode("missing Point.pos".to_string()))?;

    Coordinates::from_pos(pos)
        .map(Some)
        .ok_or_else(|| GeocodeError::Decode(format!("unparseable pos `{pos}`")))
}
