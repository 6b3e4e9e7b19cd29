//! Typed portal reads and writes used by the pages and operator commands.

use std::collections::HashMap;

use b24desk_core::calls::CallWindow;
use b24desk_core::contacts::{CommandOutcome, ImportCommand, ImportPlan};
use b24desk_core::domain::call::{CallDirection, CallRecord};
use b24desk_core::domain::customer::{Company, CompanyAddress, Contact};
use b24desk_core::domain::deal::Deal;
use b24desk_core::domain::employee::{Department, User, UserId};
use b24desk_core::domain::product::{ProductId, ProductSnapshot};
use chrono::SecondsFormat;
use serde_json::{json, Value};
use tracing::info;

use crate::batch::BatchCommand;
use crate::client::BitrixApi;
use crate::error::BitrixError;
use crate::records;

/// `crm.address.list` owner type for companies.
pub const COMPANY_ENTITY_TYPE_ID: i64 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
}

pub async fn current_user(api: &dyn BitrixApi) -> Result<CurrentUser, BitrixError> {
    let response = api.call("user.current", json!({})).await?;
    let id = response
        .result
        .get("ID")
        .and_then(UserId::from_json)
        .ok_or_else(|| BitrixError::Decode("user.current returned no ID".to_string()))?;
    let name = response.result.get("NAME").and_then(Value::as_str).unwrap_or_default().to_string();
    Ok(CurrentUser { id, name })
}

/// Newest open deals, at most `limit`.
pub async fn recent_open_deals(api: &dyn BitrixApi, limit: usize) -> Result<Vec<Deal>, BitrixError> {
    let response = api
        .call(
            "crm.deal.list",
            json!({
                "order": {"DATE_CREATE": "DESC"},
                "filter": {"CLOSED": "N"},
                "select": ["ID", "TITLE", "STAGE_ID", "OPPORTUNITY", "CURRENCY_ID"],
            }),
        )
        .await?;
    let rows = response.result.as_array().map(Vec::as_slice).unwrap_or_default();
    Ok(rows.iter().filter_map(records::deal).take(limit).collect())
}

pub async fn deal_fields(api: &dyn BitrixApi) -> Result<Value, BitrixError> {
    Ok(api.call("crm.deal.fields", json!({})).await?.result)
}

/// Creates a deal and returns its id.
pub async fn add_deal(api: &dyn BitrixApi, fields: Value) -> Result<String, BitrixError> {
    let response = api.call("crm.deal.add", json!({ "fields": fields })).await?;
    match response.result {
        Value::Number(id) => Ok(id.to_string()),
        Value::String(id) if !id.is_empty() => Ok(id),
        other => Err(BitrixError::Decode(format!("crm.deal.add returned {other}"))),
    }
}

pub async fn active_users(api: &dyn BitrixApi) -> Result<Vec<User>, BitrixError> {
    let rows = api
        .list_all(
            "user.get",
            json!({
                "filter": {"ACTIVE": true},
                "select": ["ID", "NAME", "LAST_NAME", "SECOND_NAME", "UF_DEPARTMENT", "ACTIVE"],
            }),
        )
        .await?;
    Ok(records::collect(&rows, records::user))
}

pub async fn departments(api: &dyn BitrixApi) -> Result<Vec<Department>, BitrixError> {
    let rows = api.list_all("department.get", json!({})).await?;
    Ok(records::collect(&rows, records::department))
}

/// Outbound calls started inside `window`.
pub async fn outbound_calls(
    api: &dyn BitrixApi,
    window: &CallWindow,
) -> Result<Vec<CallRecord>, BitrixError> {
    let rows = api
        .list_all(
            "voximplant.statistic.get",
            json!({
                "FILTER": {
                    ">=CALL_START_DATE": window.from.to_rfc3339_opts(SecondsFormat::Secs, true),
                    "<=CALL_START_DATE": window.to.to_rfc3339_opts(SecondsFormat::Secs, true),
                    "CALL_TYPE": CallDirection::Outbound.code(),
                },
            }),
        )
        .await?;
    Ok(rows.iter().map(records::call).collect())
}

pub async fn companies(api: &dyn BitrixApi) -> Result<Vec<Company>, BitrixError> {
    let rows = api.list_all("crm.company.list", json!({"select": ["ID", "TITLE"]})).await?;
    Ok(records::collect(&rows, records::company))
}

/// Companies and their addresses in one round trip.
pub async fn companies_with_addresses(
    api: &dyn BitrixApi,
) -> Result<(Vec<Company>, Vec<CompanyAddress>), BitrixError> {
    let response = api
        .batch(&[
            BatchCommand::new("companies", "crm.company.list", json!({"select": ["ID", "TITLE"]})),
            BatchCommand::new(
                "addresses",
                "crm.address.list",
                json!({"filter": {"ENTITY_TYPE_ID": COMPANY_ENTITY_TYPE_ID}}),
            ),
        ])
        .await?;

    let companies = records::collect(&response.list("companies")?, records::company);
    let addresses = records::collect(&response.list("addresses")?, records::company_address);
    info!(
        event_name = "bitrix.companies_loaded",
        companies = companies.len(),
        addresses = addresses.len(),
        "loaded companies and addresses"
    );
    Ok((companies, addresses))
}

pub async fn contacts(api: &dyn BitrixApi) -> Result<Vec<Contact>, BitrixError> {
    let rows = api
        .list_all(
            "crm.contact.list",
            json!({"select": ["ID", "NAME", "LAST_NAME", "COMPANY_ID", "PHONE", "EMAIL"]}),
        )
        .await?;
    Ok(records::collect(&rows, records::contact))
}

/// Sends every planned `crm.contact.add` through `batch` and returns per-key outcomes.
pub async fn add_contacts(
    api: &dyn BitrixApi,
    plan: &ImportPlan,
) -> Result<HashMap<String, CommandOutcome>, BitrixError> {
    if plan.commands.is_empty() {
        return Ok(HashMap::new());
    }

    let commands: Vec<BatchCommand> = plan
        .commands
        .iter()
        .map(|command| BatchCommand::new(&command.key, ImportCommand::METHOD, command.params()))
        .collect();
    Ok(api.batch(&commands).await?.into_outcomes())
}

/// `Ok(None)` when the portal reports the product as missing.
pub async fn product(
    api: &dyn BitrixApi,
    id: &ProductId,
) -> Result<Option<ProductSnapshot>, BitrixError> {
    match api.call("crm.product.get", json!({"id": id.0})).await {
        Ok(response) if response.result.is_object() => Ok(Some(ProductSnapshot(response.result))),
        Ok(_) => Ok(None),
        Err(error) if error.is_expired_token() => Err(error),
        Err(BitrixError::Api { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Test telephony record, as `telephony.externalcall.register` expects it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalCall {
    pub user_id: UserId,
    pub phone_number: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_secs: u64,
    pub direction: CallDirection,
    pub call_id: String,
}

pub async fn register_external_call(
    api: &dyn BitrixApi,
    call: &ExternalCall,
) -> Result<Value, BitrixError> {
    let response = api
        .call(
            "telephony.externalcall.register",
            json!({
                "USER_ID": call.user_id,
                "PHONE_NUMBER": call.phone_number,
                "CALL_START_DATE": call.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                "DURATION": call.duration_secs,
                "TYPE": call.direction.code(),
                "CALL_ID": call.call_id,
                "CRM_CREATE": 0,
                "SHOW": 0,
            }),
        )
        .await?;
    Ok(response.result)
}
