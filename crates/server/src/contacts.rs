use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Extension, Form, Multipart, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use b24desk_bitrix::{fetch, BitrixApi, BitrixError};
use b24desk_core::contacts::{
    export_rows, parse_contact_file, plan_import, write_csv, write_xlsx, CompanyLookup,
    ContactFileError, ContactFileFormat, ExistingContacts, ImportReport,
};
use serde::Deserialize;
use tera::Context;
use thiserror::Error;
use tracing::{info, warn};

use crate::app::AppState;
use crate::pages::{error_page, render, PageError, PageResult};
use crate::session::PortalSession;

#[derive(Debug, Error)]
enum ContactsError {
    #[error(transparent)]
    File(#[from] ContactFileError),
    #[error("{}", .0.description())]
    Portal(#[from] BitrixError),
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportForm {
    #[serde(default)]
    pub format: String,
}

pub async fn index(State(state): State<AppState>) -> PageResult {
    render(&state.templates, "contacts/index.html", &Context::new())
}

pub async fn export_form(State(state): State<AppState>) -> PageResult {
    render(&state.templates, "contacts/export.html", &Context::new())
}

pub async fn export(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
    Form(form): Form<ExportForm>,
) -> Result<Response, PageError> {
    if session.is_launch() {
        return export_form(State(state)).await.map(IntoResponse::into_response);
    }

    let format = ContactFileFormat::from_choice(&form.format);
    let api = state.connector.connect(&session.credentials);

    match export_file(api.as_ref(), format).await {
        Ok(bytes) => {
            info!(
                event_name = "contacts.exported",
                format = format.download_name(),
                bytes = bytes.len(),
                "contacts exported"
            );
            Ok(attachment(format, bytes))
        }
        Err(ContactsError::Portal(error)) if error.is_expired_token() => {
            Err(error_page(&state.templates, error))
        }
        Err(error) => {
            warn!(event_name = "contacts.export_failed", error = %error, "contact export failed");
            let mut context = Context::new();
            context.insert("error", &error.to_string());
            render(&state.templates, "contacts/export.html", &context)
                .map(IntoResponse::into_response)
        }
    }
}

async fn export_file(api: &dyn BitrixApi, format: ContactFileFormat) -> Result<Vec<u8>, ContactsError> {
    let contacts = fetch::contacts(api).await?;
    let companies = fetch::companies(api).await?;
    let rows = export_rows(&contacts, &companies);

    Ok(match format {
        ContactFileFormat::Csv => write_csv(&rows)?,
        ContactFileFormat::Xlsx => write_xlsx(&rows)?,
    })
}

fn attachment(format: ContactFileFormat, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", format.download_name());
    let mut response = Body::from(bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub async fn import_form(State(state): State<AppState>) -> PageResult {
    render(&state.templates, "contacts/import.html", &Context::new())
}

pub async fn import(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
    multipart: Result<Multipart, MultipartRejection>,
) -> PageResult {
    let multipart = match multipart {
        Ok(multipart) if !session.is_launch() => multipart,
        _ => return import_form(State(state)).await,
    };

    let mut context = Context::new();
    let Some((file_name, bytes)) = uploaded_file(multipart).await else {
        context.insert("error", "Файл не был загружен.");
        return render(&state.templates, "contacts/import.html", &context);
    };

    let api = state.connector.connect(&session.credentials);
    match import_file(api.as_ref(), &file_name, &bytes).await {
        Ok(report) => {
            info!(
                event_name = "contacts.imported",
                created = report.created.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "contact import finished"
            );
            insert_report(&mut context, &report);
        }
        Err(ContactsError::Portal(error)) if error.is_expired_token() => {
            return Err(error_page(&state.templates, error));
        }
        Err(error) => {
            warn!(event_name = "contacts.import_failed", error = %error, "contact import failed");
            context.insert("error", &format!("Произошла ошибка при обработке файла: {error}"));
        }
    }

    render(&state.templates, "contacts/import.html", &context)
}

async fn uploaded_file(mut multipart: Multipart) -> Option<(String, Vec<u8>)> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return None,
            Err(error) => {
                warn!(event_name = "contacts.upload_unreadable", error = %error, "bad multipart body");
                return None;
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        return match field.bytes().await {
            // Browsers send an unnamed empty part when no file was chosen.
            Ok(bytes) if !file_name.is_empty() => Some((file_name, bytes.to_vec())),
            Ok(_) => None,
            Err(error) => {
                warn!(event_name = "contacts.upload_unreadable", error = %error, "bad file part");
                None
            }
        };
    }
}

async fn import_file(
    api: &dyn BitrixApi,
    file_name: &str,
    bytes: &[u8],
) -> Result<ImportReport, ContactsError> {
    let sheet = parse_contact_file(file_name, bytes)?;
    sheet.validate_headers()?;

    let current_user = fetch::current_user(api).await?;
    let existing = ExistingContacts::from_contacts(&fetch::contacts(api).await?);
    let companies = CompanyLookup::new(&fetch::companies(api).await?);

    let plan = plan_import(&sheet.rows, &existing, &companies, current_user.id);
    let outcomes = fetch::add_contacts(api, &plan).await?;
    Ok(plan.into_report(&outcomes))
}

fn insert_report(context: &mut Context, report: &ImportReport) {
    let created: Vec<String> = report.created.iter().map(ToString::to_string).collect();
    let failed: Vec<String> = report.failed.iter().map(ToString::to_string).collect();
    let skipped: Vec<String> = report.skipped.iter().map(ToString::to_string).collect();

    context.insert("success_count", &created.len());
    context.insert("error_count", &failed.len());
    context.insert("skipped_count", &skipped.len());
    context.insert("success_details", &created);
    context.insert("error_details", &failed);
    context.insert("skipped_details", &skipped);
}
