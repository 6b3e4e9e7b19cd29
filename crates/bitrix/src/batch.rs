use std::collections::{BTreeMap, HashMap};

use b24desk_core::contacts::CommandOutcome;
use serde_json::{json, Map, Value};

use crate::error::BitrixError;

/// Commands accepted by a single `batch` request.
pub const BATCH_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq)]
pub struct BatchCommand {
    pub key: String,
    pub method: String,
    pub params: Value,
}

impl BatchCommand {
    pub fn new(key: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self { key: key.into(), method: method.into(), params }
    }

    /// `method?query`, the form `batch` expects inside `cmd`.
    pub fn encode(&self) -> String {
        let query = encode_query(&self.params);
        if query.is_empty() {
            self.method.clone()
        } else {
            format!("{}?{query}", self.method)
        }
    }
}

pub fn request_params(commands: &[BatchCommand]) -> Value {
    let cmd: Map<String, Value> = commands
        .iter()
        .map(|command| (command.key.clone(), Value::String(command.encode())))
        .collect();
    json!({ "halt": 0, "cmd": cmd })
}

/// Flattens params the way PHP's `http_build_query` does: `filter[ID][0]=1`.
/// Booleans become `1`/`0`; nulls are dropped.
pub fn encode_query(params: &Value) -> String {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            flatten(key.clone(), value, &mut pairs);
        }
    }

    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn flatten(prefix: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(format!("{prefix}[{key}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten(format!("{prefix}[{index}]"), nested, pairs);
            }
        }
        Value::Null => {}
        Value::Bool(flag) => pairs.push((prefix, if *flag { "1" } else { "0" }.to_string())),
        Value::Number(number) => pairs.push((prefix, number.to_string())),
        Value::String(text) => pairs.push((prefix, text.clone())),
    }
}

/// Per-command results of one or more `batch` requests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResponse {
    results: BTreeMap<String, Value>,
    errors: BTreeMap<String, BitrixError>,
}

impl BatchResponse {
    pub fn from_result(result: &Value) -> Result<Self, BitrixError> {
        let result = result
            .as_object()
            .ok_or_else(|| BitrixError::Decode(format!("unexpected batch result: {result}")))?;

        let errors = keyed(result.get("result_error"))
            .into_iter()
            .map(|(key, error)| {
                let code = error.get("error").and_then(Value::as_str).unwrap_or_default();
                let description =
                    error.get("error_description").and_then(Value::as_str).unwrap_or_default();
                let error =
                    BitrixError::Api { code: code.to_string(), description: description.to_string() };
                (key, error)
            })
            .collect();

        Ok(Self { results: keyed(result.get("result")), errors })
    }

    pub(crate) fn absorb(&mut self, other: BatchResponse) {
        self.results.extend(other.results);
        self.errors.extend(other.errors);
    }

    pub fn result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    pub fn error(&self, key: &str) -> Option<&BitrixError> {
        self.errors.get(key)
    }

    /// The list returned by command `key`; a failed command yields its error.
    pub fn list(&self, key: &str) -> Result<Vec<Value>, BitrixError> {
        if let Some(error) = self.errors.get(key) {
            return Err(error.clone());
        }
        match self.results.get(key) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(BitrixError::Decode(format!("`{key}` is not a list: {other}"))),
        }
    }

    pub fn into_outcomes(self) -> HashMap<String, CommandOutcome> {
        let mut outcomes: HashMap<String, CommandOutcome> =
            self.results.into_iter().map(|(key, value)| (key, Ok(value))).collect();
        for (key, error) in self.errors {
            outcomes.insert(key, Err(error.description()));
        }
        outcomes
    }
}

// Bitrix sends `[]` instead of `{}` when a batch section is empty.
fn keyed(section: Option<&Value>) -> BTreeMap<String, Value> {
    match section {
        Some(Value::Object(map)) => {
            map.iter().map(|(key, value)| (key.clone(), value.clone())).collect()
        }
        _ => BTreeMap::new(),
    }
}
