use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{
    ContactFileError, ContactFileFormat, ParsedSheet, SheetRow, HEADER_COMPANY, HEADER_EMAIL,
    HEADER_FIRST_NAME, HEADER_LAST_NAME, HEADER_PHONE,
};
use crate::domain::customer::{Company, Contact};
use crate::domain::employee::UserId;

/// Result of one `crm.contact.add` command: the new id, or the portal's error text.
pub type CommandOutcome = Result<Value, String>;

/// Parses an upload and checks its headers.
pub fn parse_contact_file(file_name: &str, bytes: &[u8]) -> Result<ParsedSheet, ContactFileError> {
    let sheet = match ContactFileFormat::from_file_name(file_name)? {
        ContactFileFormat::Csv => parse_csv(bytes)?,
        ContactFileFormat::Xlsx => parse_xlsx(bytes)?,
    };
    sheet.validate_headers()?;
    Ok(sheet)
}

fn parse_csv(bytes: &[u8]) -> Result<ParsedSheet, ContactFileError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ContactFileError::Encoding)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    // The reader skips blank lines; they come back as empty rows so row
    // numbers keep matching the lines of the file.
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut next_line: Option<u64> = None;
    for record in reader.records() {
        let record = record?;
        let start = record.position().map(|position| position.line());
        if let (Some(expected), Some(start)) = (next_line, start) {
            for _ in expected..start {
                lines.push(Vec::new());
            }
        }
        let embedded_breaks: usize = record.iter().map(|field| field.matches('\n').count()).sum();
        next_line = start.map(|start| start + 1 + embedded_breaks as u64);
        lines.push(record.iter().map(str::to_string).collect());
    }

    ParsedSheet::from_cells(lines.into_iter())
}

fn parse_xlsx(bytes: &[u8]) -> Result<ParsedSheet, ContactFileError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))
        .map_err(|error| ContactFileError::Xlsx(error.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ContactFileError::Empty)?
        .map_err(|error| ContactFileError::Xlsx(error.to_string()))?;

    ParsedSheet::from_cells(range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        // Phone numbers typed without a leading `+` arrive as floats.
        Data::Float(value) if value.fract() == 0.0 => format!("{value:.0}"),
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => value.to_string(),
        Data::Error(_) => String::new(),
    }
}

/// First phone and first email of every contact already in the portal.
#[derive(Clone, Debug, Default)]
pub struct ExistingContacts {
    phones: HashSet<String>,
    emails: HashSet<String>,
}

impl ExistingContacts {
    pub fn from_contacts(contacts: &[Contact]) -> Self {
        Self {
            phones: contacts.iter().filter_map(Contact::primary_phone).map(str::to_string).collect(),
            emails: contacts.iter().filter_map(Contact::primary_email).map(str::to_string).collect(),
        }
    }
}

/// Company id by lower-cased, trimmed title.
#[derive(Clone, Debug, Default)]
pub struct CompanyLookup(HashMap<String, String>);

impl CompanyLookup {
    pub fn new(companies: &[Company]) -> Self {
        Self(
            companies
                .iter()
                .map(|company| (company.title.trim().to_lowercase(), company.id.clone()))
                .collect(),
        )
    }

    pub fn find(&self, title: &str) -> Option<&str> {
        self.0.get(&title.trim().to_lowercase()).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SkipReason {
    DuplicatePhone(String),
    DuplicateEmail(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePhone(phone) => write!(f, "дубликат по номеру телефона: {phone}"),
            Self::DuplicateEmail(email) => write!(f, "дубликат по email: {email}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub row_number: usize,
    pub contact_name: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Строка {}: Контакт '{}' пропущен ({}).",
            self.row_number, self.contact_name, self.reason
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImportCommand {
    /// Batch key, `cmd_{data row index}`.
    pub key: String,
    pub row_number: usize,
    pub contact_name: String,
    /// `fields` for `crm.contact.add`.
    pub fields: Value,
}

impl ImportCommand {
    pub const METHOD: &'static str = "crm.contact.add";

    pub fn params(&self) -> Value {
        json!({ "fields": self.fields })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportPlan {
    pub commands: Vec<ImportCommand>,
    pub skipped: Vec<SkippedRow>,
}

/// Turns parsed rows into contact creation commands.
///
/// Rows without first and last name are dropped silently. A row whose phone or
/// email matches an existing contact is skipped. Row numbers are 1-based sheet
/// lines, so the first data row is 2.
pub fn plan_import(
    rows: &[SheetRow],
    existing: &ExistingContacts,
    companies: &CompanyLookup,
    assigned_by: UserId,
) -> ImportPlan {
    let mut plan = ImportPlan::default();

    for (index, row) in rows.iter().enumerate() {
        let first_name = row.get(HEADER_FIRST_NAME);
        let last_name = row.get(HEADER_LAST_NAME);
        if first_name.is_none() && last_name.is_none() {
            continue;
        }

        let row_number = index + 2;
        let contact_name = display_name(row);
        let phone = row.get(HEADER_PHONE);
        let email = row.get(HEADER_EMAIL);

        let duplicate = match (phone, email) {
            (Some(phone), _) if existing.phones.contains(phone) => {
                Some(SkipReason::DuplicatePhone(phone.clone()))
            }
            (_, Some(email)) if existing.emails.contains(email) => {
                Some(SkipReason::DuplicateEmail(email.clone()))
            }
            _ => None,
        };
        if let Some(reason) = duplicate {
            plan.skipped.push(SkippedRow { row_number, contact_name, reason });
            continue;
        }

        let mut fields = Map::new();
        fields.insert("NAME".to_string(), json!(first_name));
        fields.insert("LAST_NAME".to_string(), json!(last_name));
        fields.insert("OPENED".to_string(), json!("Y"));
        fields.insert("ASSIGNED_BY_ID".to_string(), json!(assigned_by));
        if let Some(phone) = phone {
            fields.insert("PHONE".to_string(), json!([{ "VALUE": phone, "VALUE_TYPE": "WORK" }]));
        }
        if let Some(email) = email {
            fields.insert("EMAIL".to_string(), json!([{ "VALUE": email, "VALUE_TYPE": "WORK" }]));
        }
        if let Some(company_id) = row.get(HEADER_COMPANY).and_then(|title| companies.find(title)) {
            fields.insert("COMPANY_ID".to_string(), json!(company_id));
        }

        plan.commands.push(ImportCommand {
            key: format!("cmd_{index}"),
            row_number,
            contact_name,
            fields: Value::Object(fields),
        });
    }

    plan
}

fn display_name(row: &SheetRow) -> String {
    let first = row.get(HEADER_FIRST_NAME).map(String::as_str).unwrap_or_default();
    let last = row.get(HEADER_LAST_NAME).map(String::as_str).unwrap_or_default();
    format!("{first} {last}").trim().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedContact {
    pub row_number: usize,
    pub contact_name: String,
    pub id: String,
}

impl fmt::Display for CreatedContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Строка {}: Контакт '{}' успешно создан (ID: {}).",
            self.row_number, self.contact_name, self.id
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedContact {
    pub row_number: usize,
    pub contact_name: String,
    pub error: String,
}

impl fmt::Display for FailedContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Строка {}: Ошибка при создании контакта '{}' - {}",
            self.row_number, self.contact_name, self.error
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: Vec<CreatedContact>,
    pub failed: Vec<FailedContact>,
    pub skipped: Vec<SkippedRow>,
}

impl ImportPlan {
    /// Matches batch outcomes back to rows. A command with no outcome counts as failed.
    pub fn into_report(self, outcomes: &HashMap<String, CommandOutcome>) -> ImportReport {
        let mut report = ImportReport { skipped: self.skipped, ..ImportReport::default() };

        for command in self.commands {
            match outcomes.get(&command.key) {
                Some(Ok(id)) => report.created.push(CreatedContact {
                    row_number: command.row_number,
                    contact_name: command.contact_name,
                    id: match id {
                        Value::String(id) => id.clone(),
                        other => other.to_string(),
                    },
                }),
                Some(Err(error)) => report.failed.push(FailedContact {
                    row_number: command.row_number,
                    contact_name: command.contact_name,
                    error: error.clone(),
                }),
                None => report.failed.push(FailedContact {
                    row_number: command.row_number,
                    contact_name: command.contact_name,
                    error: "Неизвестная ошибка".to_string(),
                }),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::{
        parse_contact_file, plan_import, CompanyLookup, ExistingContacts, SkipReason,
    };
    use crate::contacts::ContactFileError;
    use crate::domain::customer::{Company, Contact};
    use crate::domain::employee::UserId;

    fn existing() -> ExistingContacts {
        ExistingContacts::from_contacts(&[Contact {
            id: "5".to_string(),
            first_name: "Old".to_string(),
            last_name: "Contact".to_string(),
            company_id: None,
            phones: vec!["+7111".to_string(), "+7222".to_string()],
            emails: vec!["old@example.com".to_string()],
        }])
    }

    fn companies() -> CompanyLookup {
        CompanyLookup::new(&[Company { id: "10".to_string(), title: " Ромашка ".to_string() }])
    }

    #[test]
    fn csv_upload_is_parsed_with_bom_and_quotes() {
        let bytes = "\u{feff}Имя,Фамилия,Номер телефона,Почта,Компания\n\
                     Иван,Петров,+7333,,\"РОМАШКА\"\n"
            .as_bytes();

        let sheet = parse_contact_file("upload.csv", bytes).expect("parsed");

        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].get("компания").map(String::as_str), Some("РОМАШКА"));
        assert!(!sheet.rows[0].contains_key("почта"));
    }

    #[test]
    fn upload_without_surname_column_is_rejected() {
        let error = parse_contact_file("upload.csv", "имя,почта\nИван,a@b.c\n".as_bytes())
            .expect_err("missing header");
        assert!(matches!(error, ContactFileError::MissingHeaders { .. }));

        let error = parse_contact_file("upload.txt", b"").expect_err("bad extension");
        assert!(matches!(error, ContactFileError::UnsupportedFormat));
    }

    #[test]
    fn plan_skips_duplicates_and_nameless_rows() {
        let sheet = parse_contact_file(
            "upload.csv",
            "имя,фамилия,номер телефона,почта,компания\n\
             Иван,Петров,+7333,ivan@example.com,ромашка\n\
             ,,+7444,,\n\
             Дубль,Телефон,+7111,,\n\
             Дубль,Почта,,old@example.com,\n\
             Только,Второй,+7222,,\n"
                .as_bytes(),
        )
        .expect("parsed");

        let plan = plan_import(&sheet.rows, &existing(), &companies(), UserId(42));

        assert_eq!(plan.commands.len(), 2);
        let first = &plan.commands[0];
        assert_eq!(first.key, "cmd_0");
        assert_eq!(first.row_number, 2);
        assert_eq!(first.fields["ASSIGNED_BY_ID"], 42);
        assert_eq!(first.fields["OPENED"], "Y");
        assert_eq!(first.fields["COMPANY_ID"], "10");
        assert_eq!(first.fields["PHONE"][0]["VALUE_TYPE"], "WORK");
        // only the first phone of an existing contact counts as a duplicate
        assert_eq!(plan.commands[1].key, "cmd_4");

        assert_eq!(plan.skipped.len(), 2);
        assert_eq!(plan.skipped[0].row_number, 4);
        assert_eq!(plan.skipped[0].reason, SkipReason::DuplicatePhone("+7111".to_string()));
        assert_eq!(plan.skipped[1].reason, SkipReason::DuplicateEmail("old@example.com".to_string()));
        assert_eq!(
            plan.skipped[0].to_string(),
            "Строка 4: Контакт 'Дубль Телефон' пропущен (дубликат по номеру телефона: +7111)."
        );
    }

    #[test]
    fn blank_csv_lines_keep_row_numbers_aligned() {
        let sheet = parse_contact_file(
            "upload.csv",
            "имя,фамилия,номер телефона\nA,B,+1\n\n\"C\nC\",D,+7333\nE,F,+7111\n".as_bytes(),
        )
        .expect("parsed");

        assert_eq!(sheet.rows.len(), 4);
        assert!(sheet.rows[1].is_empty());

        let plan = plan_import(&sheet.rows, &existing(), &companies(), UserId(1));

        assert_eq!(plan.commands.len(), 2);
        assert_eq!(plan.commands[1].row_number, 4);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].row_number, 5);
    }

    #[test]
    fn report_maps_outcomes_to_rows() {
        let sheet = parse_contact_file(
            "upload.csv",
            "имя,фамилия\nА,Б\nВ,Г\nД,Е\n".as_bytes(),
        )
        .expect("parsed");
        let plan = plan_import(&sheet.rows, &ExistingContacts::default(), &companies(), UserId(1));
        let outcomes = HashMap::from([
            ("cmd_0".to_string(), Ok(json!(501))),
            ("cmd_1".to_string(), Err("Access denied".to_string())),
        ]);

        let report = plan.into_report(&outcomes);

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].id, "501");
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].row_number, 3);
        assert_eq!(report.failed[0].error, "Access denied");
        assert_eq!(
            report.created[0].to_string(),
            "Строка 2: Контакт 'А Б' успешно создан (ID: 501)."
        );
    }
}
