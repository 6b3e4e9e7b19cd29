use std::time::Duration;

use async_trait::async_trait;
use b24desk_core::auth::PortalCredentials;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::batch::{self, BatchCommand, BatchResponse, BATCH_LIMIT};
use crate::error::BitrixError;

/// Decoded envelope of one REST call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub result: Value,
    /// Offset of the next page for list methods.
    pub next: Option<u64>,
    pub total: Option<u64>,
}

impl ApiResponse {
    pub fn from_body(body: Value) -> Result<Self, BitrixError> {
        if let Some(code) = body.get("error") {
            return Err(BitrixError::Api {
                code: code.as_str().map(str::to_string).unwrap_or_else(|| code.to_string()),
                description: body
                    .get("error_description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let next = body.get("next").and_then(Value::as_u64);
        let total = body.get("total").and_then(Value::as_u64);
        match body {
            Value::Object(mut map) => {
                let result = map
                    .remove("result")
                    .ok_or_else(|| BitrixError::Decode("response has no `result`".to_string()))?;
                Ok(Self { result, next, total })
            }
            other => Err(BitrixError::Decode(format!("unexpected response body: {other}"))),
        }
    }
}

#[async_trait]
pub trait BitrixApi: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<ApiResponse, BitrixError>;

    /// Follows `next` offsets until the list is exhausted.
    async fn list_all(&self, method: &str, params: Value) -> Result<Vec<Value>, BitrixError> {
        let mut items = Vec::new();
        let mut start: Option<u64> = None;

        loop {
            let mut page_params = params.clone();
            if let (Some(start), Some(map)) = (start, page_params.as_object_mut()) {
                map.insert("start".to_string(), json!(start));
            }

            let response = self.call(method, page_params).await?;
            match response.result {
                Value::Array(page) => items.extend(page),
                Value::Null => {}
                other => {
                    return Err(BitrixError::Decode(format!(
                        "`{method}` returned a non-list result: {other}"
                    )))
                }
            }

            match response.next {
                Some(next) if start.map_or(true, |current| next > current) => start = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    /// Runs commands through `batch`, at most [`BATCH_LIMIT`] per request, without halting
    /// on individual failures.
    async fn batch(&self, commands: &[BatchCommand]) -> Result<BatchResponse, BitrixError> {
        let mut merged = BatchResponse::default();
        for chunk in commands.chunks(BATCH_LIMIT) {
            let response = self.call("batch", batch::request_params(chunk)).await?;
            merged.absorb(BatchResponse::from_result(&response.result)?);
        }
        Ok(merged)
    }
}

/// REST client bound to one portal, authenticated by access token or by webhook URL.
#[derive(Clone)]
pub struct BitrixClient {
    http: Client,
    endpoint: String,
    access_token: Option<SecretString>,
}

impl std::fmt::Debug for BitrixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitrixClient")
            .field("token_auth", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

impl BitrixClient {
    pub fn http_client(timeout: Duration) -> Result<Client, BitrixError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| BitrixError::Transport(error.to_string()))
    }

    pub fn for_portal(http: Client, credentials: &PortalCredentials) -> Self {
        Self::with_endpoint(
            http,
            portal_endpoint(&credentials.domain),
            Some(credentials.access_token.clone().into()),
        )
    }

    /// The webhook URL already carries the user id and secret code.
    pub fn for_webhook(http: Client, webhook_url: &SecretString) -> Self {
        Self::with_endpoint(http, webhook_url.expose_secret().to_string(), None)
    }

    pub fn with_endpoint(
        http: Client,
        endpoint: impl Into<String>,
        access_token: Option<SecretString>,
    ) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        Self { http, endpoint, access_token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{method}.json", self.endpoint)
    }
}

fn portal_endpoint(domain: &str) -> String {
    let host = domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!("https://{host}/rest/")
}

#[async_trait]
impl BitrixApi for BitrixClient {
    async fn call(&self, method: &str, params: Value) -> Result<ApiResponse, BitrixError> {
        let mut body = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(BitrixError::Decode(format!(
                    "params for `{method}` must be an object, got {other}"
                )))
            }
        };
        if let Some(token) = &self.access_token {
            body.insert("auth".to_string(), Value::String(token.expose_secret().to_string()));
        }

        debug!(method, "calling bitrix method");
        let response = self
            .http
            .post(self.method_url(method))
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|error| {
                warn!(event_name = "bitrix.transport_failed", method, error = %error);
                BitrixError::from(error)
            })?;

        let status = response.status();
        let text = response.text().await?;
        let outcome = match serde_json::from_str::<Value>(&text) {
            Ok(body) if status.is_success() || body.get("error").is_some() => {
                ApiResponse::from_body(body)
            }
            Ok(_) => Err(BitrixError::Status { status: status.as_u16() }),
            Err(error) if status.is_success() => Err(BitrixError::Decode(error.to_string())),
            Err(_) => Err(BitrixError::Status { status: status.as_u16() }),
        };

        if let Err(error) = &outcome {
            warn!(
                event_name = "bitrix.call_failed",
                method,
                status = status.as_u16(),
                error = %error,
                "bitrix method returned an error"
            );
        }
        outcome
    }
}
