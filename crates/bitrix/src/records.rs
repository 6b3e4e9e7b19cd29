//! Raw portal JSON into typed core records.
//!
//! Portal payloads mix numeric and string ids, omit empty fields and send
//! booleans as `"Y"`/`"N"` in places. Everything here is lenient: a record that
//! lacks its id is dropped, anything else missing becomes empty.

use std::str::FromStr;

use b24desk_core::domain::call::{CallDirection, CallRecord};
use b24desk_core::domain::customer::{Company, CompanyAddress, Contact};
use b24desk_core::domain::deal::Deal;
use b24desk_core::domain::employee::{Department, DepartmentId, User, UserId};
use rust_decimal::Decimal;
use serde_json::Value;

fn text(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn text_or_empty(record: &Value, key: &str) -> String {
    text(record, key).unwrap_or_default()
}

fn integer(record: &Value, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(value) => value.as_i64().or_else(|| value.as_f64().map(|v| v as i64)),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

fn flag(record: &Value, key: &str) -> Option<bool> {
    match record.get(key)? {
        Value::Bool(value) => Some(*value),
        Value::String(value) => match value.trim() {
            "Y" | "true" | "1" => Some(true),
            "N" | "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(value) => value.as_i64().map(|value| value != 0),
        _ => None,
    }
}

/// `user.get` row. Users without an explicit `ACTIVE` flag are taken as active,
/// since the list is requested with an `ACTIVE` filter.
pub fn user(record: &Value) -> Option<User> {
    let id = UserId::from_json(record.get("ID")?)?;
    let departments = match record.get("UF_DEPARTMENT") {
        Some(Value::Array(items)) => items.iter().filter_map(DepartmentId::from_json).collect(),
        Some(single) => DepartmentId::from_json(single).into_iter().collect(),
        None => Vec::new(),
    };

    Some(User {
        id,
        first_name: text_or_empty(record, "NAME"),
        last_name: text_or_empty(record, "LAST_NAME"),
        middle_name: text_or_empty(record, "SECOND_NAME"),
        departments,
        active: flag(record, "ACTIVE").unwrap_or(true),
    })
}

/// `department.get` row. `UF_HEAD` of `0` or empty means no head.
pub fn department(record: &Value) -> Option<Department> {
    let id = DepartmentId::from_json(record.get("ID")?)?;
    let head = record.get("UF_HEAD").and_then(UserId::from_json);
    Some(Department { id, name: text_or_empty(record, "NAME"), head })
}

/// `voximplant.statistic.get` row.
pub fn call(record: &Value) -> CallRecord {
    CallRecord {
        user_id: record.get("PORTAL_USER_ID").and_then(UserId::from_json),
        duration_secs: integer(record, "CALL_DURATION").unwrap_or(0).max(0) as u64,
        direction: integer(record, "CALL_TYPE")
            .map(CallDirection::from_code)
            .unwrap_or(CallDirection::Unknown),
    }
}

pub fn deal(record: &Value) -> Option<Deal> {
    Some(Deal {
        id: text(record, "ID")?,
        title: text_or_empty(record, "TITLE"),
        stage_id: text_or_empty(record, "STAGE_ID"),
        opportunity: text(record, "OPPORTUNITY").and_then(|raw| Decimal::from_str(&raw).ok()),
        currency_id: text_or_empty(record, "CURRENCY_ID"),
    })
}

pub fn company(record: &Value) -> Option<Company> {
    Some(Company { id: text(record, "ID")?, title: text_or_empty(record, "TITLE") })
}

/// `crm.address.list` row; `ENTITY_ID` is the owning company.
pub fn company_address(record: &Value) -> Option<CompanyAddress> {
    Some(CompanyAddress {
        company_id: text(record, "ENTITY_ID")?,
        country: text(record, "COUNTRY"),
        province: text(record, "PROVINCE"),
        city: text(record, "CITY"),
        address_1: text(record, "ADDRESS_1"),
        address_2: text(record, "ADDRESS_2"),
    })
}

/// Multi-field (`PHONE`, `EMAIL`) values in portal order.
fn multi_field(record: &Value, key: &str) -> Vec<String> {
    match record.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(|item| text(item, "VALUE")).collect(),
        _ => Vec::new(),
    }
}

pub fn contact(record: &Value) -> Option<Contact> {
    Some(Contact {
        id: text(record, "ID")?,
        first_name: text_or_empty(record, "NAME"),
        last_name: text_or_empty(record, "LAST_NAME"),
        company_id: text(record, "COMPANY_ID").filter(|id| id != "0"),
        phones: multi_field(record, "PHONE"),
        emails: multi_field(record, "EMAIL"),
    })
}

pub fn collect<T>(records: &[Value], parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    records.iter().filter_map(parse).collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use b24desk_core::domain::call::CallDirection;
    use b24desk_core::domain::employee::{DepartmentId, UserId};

    use super::{call, company_address, contact, deal, department, user};

    #[test]
    fn user_ids_and_departments_accept_strings_and_numbers() {
        let parsed = user(&json!({
            "ID": "12",
            "NAME": "Anna",
            "LAST_NAME": "Petrova",
            "UF_DEPARTMENT": [3, "5"],
            "ACTIVE": true
        }))
        .expect("user");

        assert_eq!(parsed.id, UserId(12));
        assert_eq!(parsed.departments, vec![DepartmentId(3), DepartmentId(5)]);
        assert_eq!(parsed.middle_name, "");
        assert!(parsed.active);
        assert!(user(&json!({"NAME": "No id"})).is_none());
    }

    #[test]
    fn department_without_head_is_kept_headless() {
        let headless = department(&json!({"ID": "4", "NAME": "Ops", "UF_HEAD": "0"})).expect("dept");
        let headed = department(&json!({"ID": 5, "NAME": "Sales", "UF_HEAD": "9"})).expect("dept");

        assert_eq!(headless.head, None);
        assert_eq!(headed.head, Some(UserId(9)));
    }

    #[test]
    fn call_rows_parse_duration_and_type() {
        let parsed = call(&json!({"PORTAL_USER_ID": "3", "CALL_DURATION": "75", "CALL_TYPE": "1"}));

        assert_eq!(parsed.user_id, Some(UserId(3)));
        assert_eq!(parsed.duration_secs, 75);
        assert_eq!(parsed.direction, CallDirection::Outbound);

        let bare = call(&json!({}));
        assert_eq!(bare.user_id, None);
        assert_eq!(bare.direction, CallDirection::Unknown);
    }

    #[test]
    fn deal_amount_is_decimal() {
        let parsed = deal(&json!({"ID": "1", "TITLE": "T", "STAGE_ID": "NEW", "OPPORTUNITY": "1500.50"}))
            .expect("deal");
        assert_eq!(parsed.opportunity, Some(Decimal::new(150050, 2)));
    }

    #[test]
    fn contact_multi_fields_keep_order() {
        let parsed = contact(&json!({
            "ID": "8",
            "NAME": "Ivan",
            "COMPANY_ID": "0",
            "PHONE": [{"VALUE": "+7111", "VALUE_TYPE": "WORK"}, {"VALUE": "+7222"}],
        }))
        .expect("contact");

        assert_eq!(parsed.primary_phone(), Some("+7111"));
        assert_eq!(parsed.company_id, None);
        assert!(parsed.emails.is_empty());
    }

    #[test]
    fn address_needs_owner() {
        let parsed =
            company_address(&json!({"ENTITY_ID": "4", "CITY": "Москва", "ADDRESS_2": ""})).expect("addr");

        assert_eq!(parsed.city.as_deref(), Some("Москва"));
        assert_eq!(parsed.address_2, None);
        assert!(company_address(&json!({"CITY": "x"})).is_none());
    }
}
