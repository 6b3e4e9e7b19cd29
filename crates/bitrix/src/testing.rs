//! In-process `BitrixApi` double for tests in this and dependent crates.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ApiResponse, BitrixApi};
use crate::error::BitrixError;

/// Canned responses by method name; records every call.
#[derive(Default)]
pub struct ScriptedApi {
    responses: HashMap<String, Result<Value, BitrixError>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedApi {
    pub fn with(mut self, method: &str, response: Result<Value, BitrixError>) -> Self {
        self.responses.insert(method.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn called(&self, method: &str) -> bool {
        self.calls().iter().any(|(name, _)| name == method)
    }
}

#[async_trait]
impl BitrixApi for ScriptedApi {
    async fn call(&self, method: &str, params: Value) -> Result<ApiResponse, BitrixError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), params));
        }
        match self.responses.get(method) {
            Some(Ok(result)) => Ok(ApiResponse { result: result.clone(), next: None, total: None }),
            Some(Err(error)) => Err(error.clone()),
            None => Err(BitrixError::Api {
                code: "ERROR_METHOD_NOT_FOUND".to_string(),
                description: method.to_string(),
            }),
        }
    }
}
