use axum::extract::{Extension, Form, Path, State};
use b24desk_bitrix::fetch;
use b24desk_core::domain::product::{ProductId, ProductQr};
use b24desk_core::errors::ApplicationError;
use b24desk_core::qr::{public_url, svg_data_uri};
use b24desk_db::RepositoryError;
use serde::{Deserialize, Serialize};
use tera::Context;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::pages::{error_page, render, PageResult};
use crate::session::PortalSession;

const RECENT_CODES: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct QrForm {
    #[serde(default)]
    pub product_id: String,
}

/// Row of the "recently generated" list.
#[derive(Debug, Serialize)]
struct RecentCode {
    uuid: String,
    product_id: String,
    name: String,
    public_url: String,
    created_at: String,
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

pub async fn index(State(state): State<AppState>) -> PageResult {
    form_page(&state, None, "").await
}

pub async fn generate(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
    Form(form): Form<QrForm>,
) -> PageResult {
    if session.is_launch() {
        return form_page(&state, None, "").await;
    }

    let Some(product_id) = ProductId::parse(&form.product_id) else {
        let message = "Некорректный ID товара: допускаются только цифры.";
        return form_page(&state, Some(message), &form.product_id).await;
    };

    let api = state.connector.connect(&session.credentials);
    let snapshot = match fetch::product(api.as_ref(), &product_id).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return form_page(&state, Some("Товар не найден"), &product_id.0).await,
        Err(error) => return Err(error_page(&state.templates, error)),
    };

    let record = ProductQr::new(product_id, session.credentials.member_id.clone(), snapshot);
    state
        .qr_codes
        .save(&record)
        .await
        .map_err(|error| error_page(&state.templates, persistence(error)))?;

    let url = public_url(&state.config.bitrix.app_base_url, record.id);
    let qr_image = svg_data_uri(&url).map_err(|error| {
        error_page(&state.templates, ApplicationError::Configuration(error.to_string()))
    })?;
    info!(
        event_name = "product_qr.generated",
        qr_id = %record.id,
        product_id = %record.product_id.0,
        "product qr code generated"
    );

    let mut context = Context::new();
    context.insert("product", &record.product.0);
    context.insert("qr_image", &qr_image);
    context.insert("public_url", &url);
    context.insert("uuid", &record.id.to_string());
    render(&state.templates, "product_qr/generated.html", &context)
}

async fn form_page(state: &AppState, error: Option<&str>, product_id: &str) -> PageResult {
    let recent = match state.qr_codes.list_recent(RECENT_CODES).await {
        Ok(records) => records
            .iter()
            .map(|record| RecentCode {
                uuid: record.id.to_string(),
                product_id: record.product_id.0.clone(),
                name: record.product.name().unwrap_or_default().to_string(),
                public_url: public_url(&state.config.bitrix.app_base_url, record.id),
                created_at: record.created_at.format("%d.%m.%Y %H:%M").to_string(),
            })
            .collect(),
        Err(error) => {
            warn!(event_name = "product_qr.recent_failed", error = %error, "recent codes unavailable");
            Vec::new()
        }
    };

    let mut context = Context::new();
    context.insert("error", &error);
    context.insert("product_id", product_id);
    context.insert("recent", &recent);
    render(&state.templates, "product_qr/index.html", &context)
}

/// Public page behind the QR code; needs no portal session.
pub async fn view(State(state): State<AppState>, Path(id): Path<String>) -> PageResult {
    let not_found = || {
        error_page(&state.templates, ApplicationError::NotFound(format!("qr code `{id}`")))
    };
    let Ok(uuid) = Uuid::parse_str(&id) else {
        return Err(not_found());
    };

    let record = state
        .qr_codes
        .find(uuid)
        .await
        .map_err(|error| error_page(&state.templates, persistence(error)))?
        .ok_or_else(not_found)?;

    let mut context = Context::new();
    context.insert("product", &record.product.0);
    context.insert("qr_uuid", &record.id.to_string());
    context.insert("created_at", &record.created_at.format("%d.%m.%Y %H:%M").to_string());
    render(&state.templates, "product_qr/view.html", &context)
}
