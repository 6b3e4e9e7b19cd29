use std::collections::HashMap;

use rust_xlsxwriter::Workbook;
use serde::Serialize;

use super::{ContactFileError, CONTACT_HEADERS, XLSX_SHEET_NAME};
use crate::domain::customer::{Company, Contact};

const UTF8_BOM: &str = "\u{feff}";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub company: String,
}

impl ExportRow {
    fn cells(&self) -> [&str; 5] {
        [&self.first_name, &self.last_name, &self.phone, &self.email, &self.company]
    }
}

/// One row per contact with its first phone, first email and company title.
pub fn export_rows(contacts: &[Contact], companies: &[Company]) -> Vec<ExportRow> {
    let titles: HashMap<&str, &str> =
        companies.iter().map(|company| (company.id.as_str(), company.title.as_str())).collect();

    contacts
        .iter()
        .map(|contact| ExportRow {
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            phone: contact.primary_phone().unwrap_or_default().to_string(),
            email: contact.primary_email().unwrap_or_default().to_string(),
            company: contact
                .company_id
                .as_deref()
                .and_then(|id| titles.get(id).copied())
                .unwrap_or_default()
                .to_string(),
        })
        .collect()
}

/// UTF-8 CSV with a leading byte-order mark so Excel picks the right encoding.
pub fn write_csv(rows: &[ExportRow]) -> Result<Vec<u8>, ContactFileError> {
    let mut writer = csv::Writer::from_writer(UTF8_BOM.as_bytes().to_vec());
    writer.write_record(CONTACT_HEADERS)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }

    writer.into_inner().map_err(|error| ContactFileError::Csv(error.into_error().into()))
}

pub fn write_xlsx(rows: &[ExportRow]) -> Result<Vec<u8>, ContactFileError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(XLSX_SHEET_NAME)?;

    for (column, header) in CONTACT_HEADERS.iter().enumerate() {
        worksheet.write_string(0, column as u16, *header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let line = sheet_row(index)?;
        for (column, value) in row.cells().iter().enumerate() {
            worksheet.write_string(line, column as u16, *value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Worksheet row for the data row at `index`; row 0 holds the headers.
fn sheet_row(index: usize) -> Result<u32, ContactFileError> {
    index
        .checked_add(1)
        .and_then(|row| u32::try_from(row).ok())
        .ok_or(ContactFileError::TooManyRows(index))
}
