use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub company_id: Option<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}

impl Contact {
    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub title: String,
}

/// A `crm.address.list` row bound to a company (`ENTITY_TYPE_ID = 4`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAddress {
    pub company_id: String,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
}
