//! Deal form rules and stage labels.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::DealsConfig;
use crate::domain::deal::LeadSourceOption;

const STAGE_LABELS: &[(&str, &str)] = &[
    ("NEW", "Новая"),
    ("PREPARATION", "Подготовка"),
    ("PREPAYMENT_INVOICE", "Счет на предоплату"),
    ("EXECUTING", "Выполняется"),
    ("FINAL_INVOICE", "Финальный счет"),
    ("WON", "Успешно реализована"),
    ("LOSE", "Проиграна"),
];

/// Display label for a pipeline stage; unknown stage ids pass through.
pub fn stage_label(stage_id: &str) -> &str {
    STAGE_LABELS
        .iter()
        .find(|(id, _)| *id == stage_id)
        .map(|(_, label)| *label)
        .unwrap_or(stage_id)
}

/// Raw form input, untrimmed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DealForm {
    pub title: String,
    pub lead_source: String,
    pub opportunity: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDeal {
    pub title: String,
    pub lead_source: String,
    pub opportunity: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DealFormError {
    #[error("Название сделки обязательно")]
    MissingTitle,
    #[error("Источник лида обязателен")]
    MissingLeadSource,
    #[error("Сумма должна быть числом")]
    InvalidAmount,
}

impl DealForm {
    pub fn validate(&self) -> Result<NewDeal, DealFormError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DealFormError::MissingTitle);
        }

        let lead_source = self.lead_source.trim();
        if lead_source.is_empty() {
            return Err(DealFormError::MissingLeadSource);
        }

        let opportunity = match self.opportunity.trim() {
            "" => None,
            raw => Some(parse_amount(raw)?),
        };

        Ok(NewDeal { title: title.to_string(), lead_source: lead_source.to_string(), opportunity })
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, DealFormError> {
    // Russian locale users type a decimal comma.
    let normalized = raw.replace([' ', '\u{a0}'], "").replace(',', ".");
    Decimal::from_str(&normalized).map_err(|_| DealFormError::InvalidAmount)
}

impl NewDeal {
    /// `fields` payload for `crm.deal.add`.
    pub fn to_fields(&self, config: &DealsConfig) -> Value {
        let mut fields = Map::new();
        fields.insert("TITLE".to_string(), json!(self.title));
        fields.insert("STAGE_ID".to_string(), json!(config.default_stage));
        fields.insert(config.custom_field_name.clone(), json!(self.lead_source));
        fields.insert("CURRENCY_ID".to_string(), json!(config.default_currency));
        if let Some(amount) = self.opportunity {
            fields.insert("OPPORTUNITY".to_string(), json!(amount.to_string()));
        }
        Value::Object(fields)
    }
}

/// Enumeration items of `field_name` from a `crm.deal.fields` result.
/// `None` when the field is absent or has no items.
pub fn lead_source_options(fields: &Value, field_name: &str) -> Option<Vec<LeadSourceOption>> {
    let items = fields.get(field_name)?.get("items")?.as_array()?;
    let options: Vec<LeadSourceOption> = items
        .iter()
        .filter_map(|item| {
            let id = match item.get("ID")? {
                Value::String(id) => id.clone(),
                Value::Number(id) => id.to_string(),
                _ => return None,
            };
            let value = item.get("VALUE")?.as_str()?.to_string();
            Some(LeadSourceOption { id, value })
        })
        .collect();

    (!options.is_empty()).then_some(options)
}
