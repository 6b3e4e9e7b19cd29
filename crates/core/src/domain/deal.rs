use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub title: String,
    pub stage_id: String,
    pub opportunity: Option<Decimal>,
    pub currency_id: String,
}

/// One enumeration item of a list-type user field (`crm.deal.fields`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSourceOption {
    pub id: String,
    pub value: String,
}
