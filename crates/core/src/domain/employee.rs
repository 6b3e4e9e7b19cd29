use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Portal user identifier. Bitrix24 sends these both as JSON numbers and as
/// numeric strings; everything past the parsing boundary uses this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(pub i64);

impl UserId {
    pub fn from_json(value: &Value) -> Option<Self> {
        json_id(value).filter(|id| *id > 0).map(Self)
    }
}

impl DepartmentId {
    pub fn from_json(value: &Value) -> Option<Self> {
        json_id(value).map(Self)
    }

    /// Zero and negative ids mean "no department" in portal payloads.
    pub fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim().parse::<i64>().map(Self)
    }
}

impl FromStr for DepartmentId {
    type Err = std::num::ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim().parse::<i64>().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn json_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    /// Membership in portal order; only the first entry drives the hierarchy.
    pub departments: Vec<DepartmentId>,
    pub active: bool,
}

impl User {
    pub fn primary_department(&self) -> Option<DepartmentId> {
        self.departments.first().copied().filter(|department| department.is_assigned())
    }

    /// `Last First Middle`, as the portal renders employee cards.
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.last_name, self.first_name, self.middle_name).trim().to_string()
    }

    pub fn short_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name).trim().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub head: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DepartmentId, User, UserId};

    fn user(departments: Vec<i64>) -> User {
        User {
            id: UserId(7),
            first_name: "Anna".to_string(),
            last_name: "Petrova".to_string(),
            middle_name: String::new(),
            departments: departments.into_iter().map(DepartmentId).collect(),
            active: true,
        }
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        assert_eq!(UserId::from_json(&json!(12)), Some(UserId(12)));
        assert_eq!(UserId::from_json(&json!(" 12 ")), Some(UserId(12)));
        assert_eq!(UserId::from_json(&json!("")), None);
        assert_eq!(UserId::from_json(&json!(0)), None);
        assert_eq!(UserId::from_json(&json!(null)), None);
        assert_eq!(DepartmentId::from_json(&json!("3")), Some(DepartmentId(3)));
    }

    #[test]
    fn primary_department_ignores_unassigned_first_entry() {
        assert_eq!(user(vec![4, 9]).primary_department(), Some(DepartmentId(4)));
        assert_eq!(user(vec![0, 9]).primary_department(), None);
        assert_eq!(user(vec![]).primary_department(), None);
    }

    #[test]
    fn names_skip_missing_parts_at_the_edges() {
        let mut subject = user(vec![1]);
        assert_eq!(subject.full_name(), "Petrova Anna");
        subject.middle_name = "Sergeevna".to_string();
        assert_eq!(subject.full_name(), "Petrova Anna Sergeevna");
        assert_eq!(subject.short_name(), "Petrova Anna");
    }
}
