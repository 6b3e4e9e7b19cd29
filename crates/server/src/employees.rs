use axum::extract::{Extension, State};
use b24desk_bitrix::employee_directory;
use chrono::Utc;
use tera::Context;

use crate::app::AppState;
use crate::pages::{error_page, render, PageResult};
use crate::session::PortalSession;

pub async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
) -> PageResult {
    let api = state.connector.connect(&session.credentials);
    let employees = employee_directory(api.as_ref(), &state.config.calls, Utc::now())
        .await
        .map_err(|error| error_page(&state.templates, error))?;

    let mut context = Context::new();
    context.insert("employees", &employees);
    context.insert("window_hours", &state.config.calls.window_hours);
    context.insert("min_duration_secs", &state.config.calls.min_duration_secs);
    render(&state.templates, "employees/index.html", &context)
}
