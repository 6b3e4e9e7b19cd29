//! Contact spreadsheets: export rows, import parsing and import planning.

pub mod export;
pub mod import;

use std::collections::BTreeMap;

use thiserror::Error;

pub use export::{export_rows, write_csv, write_xlsx, ExportRow};
pub use import::{
    parse_contact_file, plan_import, CommandOutcome, CompanyLookup, CreatedContact,
    ExistingContacts, FailedContact, ImportCommand, ImportPlan, ImportReport, SkipReason,
    SkippedRow,
};

pub const HEADER_FIRST_NAME: &str = "имя";
pub const HEADER_LAST_NAME: &str = "фамилия";
pub const HEADER_PHONE: &str = "номер телефона";
pub const HEADER_EMAIL: &str = "почта";
pub const HEADER_COMPANY: &str = "компания";

pub const CONTACT_HEADERS: [&str; 5] =
    [HEADER_FIRST_NAME, HEADER_LAST_NAME, HEADER_PHONE, HEADER_EMAIL, HEADER_COMPANY];
pub const REQUIRED_HEADERS: [&str; 2] = [HEADER_FIRST_NAME, HEADER_LAST_NAME];

pub const XLSX_SHEET_NAME: &str = "Contacts";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactFileFormat {
    Csv,
    Xlsx,
}

impl ContactFileFormat {
    /// Upload format, decided by extension only.
    pub fn from_file_name(name: &str) -> Result<Self, ContactFileError> {
        let lower = name.trim().to_lowercase();
        if lower.ends_with(".csv") {
            Ok(Self::Csv)
        } else if lower.ends_with(".xlsx") {
            Ok(Self::Xlsx)
        } else {
            Err(ContactFileError::UnsupportedFormat)
        }
    }

    /// Export form choice; anything but `xlsx` means CSV.
    pub fn from_choice(choice: &str) -> Self {
        if choice.trim().eq_ignore_ascii_case("xlsx") {
            Self::Xlsx
        } else {
            Self::Csv
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn download_name(self) -> &'static str {
        match self {
            Self::Csv => "contacts.csv",
            Self::Xlsx => "contacts.xlsx",
        }
    }
}

#[derive(Debug, Error)]
pub enum ContactFileError {
    #[error("Неподдерживаемый формат файла. Пожалуйста, используйте CSV или XLSX.")]
    UnsupportedFormat,
    #[error("Файл пуст.")]
    Empty,
    #[error(
        "Ошибка в заголовках файла. Убедитесь, что файл содержит обязательные колонки: {required:?}. Найденные заголовки: {found:?}."
    )]
    MissingHeaders { required: Vec<String>, found: Vec<String> },
    #[error("Файл CSV не в кодировке UTF-8.")]
    Encoding,
    #[error("Не удалось прочитать CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Не удалось прочитать XLSX: {0}")]
    Xlsx(String),
    #[error("Слишком много строк для XLSX: {0}.")]
    TooManyRows(usize),
    #[error("Не удалось сформировать XLSX: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
}

/// One data row keyed by normalised header; empty cells are absent.
pub type SheetRow = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl ParsedSheet {
    /// Builds rows from raw cell text, header row first.
    pub fn from_cells<I, R>(mut lines: I) -> Result<Self, ContactFileError>
    where
        I: Iterator<Item = R>,
        R: IntoIterator<Item = String>,
    {
        let headers: Vec<String> = lines
            .next()
            .ok_or(ContactFileError::Empty)?
            .into_iter()
            .map(|cell| normalize_header(&cell))
            .collect();

        let rows = lines
            .map(|line| {
                headers
                    .iter()
                    .zip(line)
                    .filter(|(header, _)| !header.is_empty())
                    .filter_map(|(header, cell)| {
                        normalize_cell(&cell).map(|value| (header.clone(), value))
                    })
                    .collect::<SheetRow>()
            })
            .collect();

        Ok(Self { headers, rows })
    }

    pub fn validate_headers(&self) -> Result<(), ContactFileError> {
        let complete =
            REQUIRED_HEADERS.iter().all(|required| self.headers.iter().any(|h| h == required));
        if complete {
            Ok(())
        } else {
            Err(ContactFileError::MissingHeaders {
                required: REQUIRED_HEADERS.iter().map(|header| header.to_string()).collect(),
                found: self.headers.clone(),
            })
        }
    }
}

/// Cell clean-up applied to every imported value. Spreadsheets saved outside
/// Excel carry stray byte-order marks and non-breaking spaces.
pub fn normalize_cell(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| *ch != '\u{feff}')
        .map(|ch| if ch == '\u{a0}' { ' ' } else { ch })
        .collect();
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn normalize_header(raw: &str) -> String {
    normalize_cell(raw).map(|header| header.to_lowercase()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{normalize_cell, normalize_header, ContactFileError, ContactFileFormat, ParsedSheet};

    fn lines(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter().map(|line| line.iter().map(|cell| cell.to_string()).collect()).collect()
    }

    #[test]
    fn format_is_chosen_by_extension() {
        assert_eq!(ContactFileFormat::from_file_name("list.CSV").ok(), Some(ContactFileFormat::Csv));
        assert_eq!(
            ContactFileFormat::from_file_name("list.xlsx").ok(),
            Some(ContactFileFormat::Xlsx)
        );
        assert!(matches!(
            ContactFileFormat::from_file_name("list.xls"),
            Err(ContactFileError::UnsupportedFormat)
        ));
        assert_eq!(ContactFileFormat::from_choice("pdf"), ContactFileFormat::Csv);
    }

    #[test]
    fn cells_lose_bom_and_nbsp() {
        assert_eq!(normalize_cell("\u{feff} Иван\u{a0}"), Some("Иван".to_string()));
        assert_eq!(normalize_cell("\u{a0} "), None);
        assert_eq!(normalize_header(" Имя "), "имя");
    }

    #[test]
    fn rows_drop_empty_cells_and_unnamed_columns() {
        let sheet = ParsedSheet::from_cells(
            lines(&[&["Имя", "Фамилия", ""], &["Иван", " ", "x"], &["Олег"]]).into_iter(),
        )
        .expect("parsed");

        assert_eq!(sheet.headers, vec!["имя", "фамилия", ""]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].get("имя").map(String::as_str), Some("Иван"));
        assert!(!sheet.rows[0].contains_key("фамилия"));
        assert_eq!(sheet.rows[0].len(), 1);
        assert_eq!(sheet.rows[1].len(), 1);
    }

    #[test]
    fn required_headers_are_checked() {
        let sheet =
            ParsedSheet::from_cells(lines(&[&["имя", "почта"]]).into_iter()).expect("parsed");

        let error = sheet.validate_headers().expect_err("missing surname");
        assert!(error.to_string().contains("фамилия"));
        assert!(matches!(
            ParsedSheet::from_cells(Vec::<Vec<String>>::new().into_iter()),
            Err(ContactFileError::Empty)
        ));
    }
}
