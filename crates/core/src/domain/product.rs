use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    /// Catalog ids are positive integers typed in by hand; anything else is rejected
    /// before the portal is asked.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let numeric = !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit());
        numeric.then(|| Self(trimmed.to_string()))
    }
}

/// A product as returned by `crm.product.get`, kept verbatim so the public page
/// can render it without portal credentials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot(pub Value);

impl ProductSnapshot {
    pub fn name(&self) -> Option<&str> {
        self.0.get("NAME").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductQr {
    pub id: Uuid,
    pub product_id: ProductId,
    pub member_id: Option<String>,
    pub product: ProductSnapshot,
    pub created_at: DateTime<Utc>,
}

impl ProductQr {
    pub fn new(product_id: ProductId, member_id: Option<String>, product: ProductSnapshot) -> Self {
        Self { id: Uuid::new_v4(), product_id, member_id, product, created_at: Utc::now() }
    }
}
