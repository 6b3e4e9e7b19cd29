use axum::http::StatusCode;
use axum::response::Html;
use b24desk_core::errors::ApplicationError;
use tera::{Context, Tera};
use tracing::{error, warn};
use uuid::Uuid;

pub type PageError = (StatusCode, Html<String>);
pub type PageResult = Result<Html<String>, PageError>;

pub fn render(templates: &Tera, name: &str, context: &Context) -> PageResult {
    templates.render(name, context).map(Html).map_err(|render_error| {
        error!(
            event_name = "server.template.render_failed",
            template = name,
            error = %render_error,
            "template rendering failed"
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<h1>Ошибка отображения страницы</h1>".to_string()),
        )
    })
}

/// Error page for a failed request; the correlation id is logged and shown.
pub fn error_page(templates: &Tera, failure: impl Into<ApplicationError>) -> PageError {
    let failure = failure.into();
    let correlation_id = Uuid::new_v4().to_string();
    let detail = failure.to_string();
    let interface = failure.into_interface(correlation_id.clone());
    let status =
        StatusCode::from_u16(interface.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(
            event_name = "server.request.failed",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %detail,
            "request failed"
        );
    } else {
        warn!(
            event_name = "server.request.rejected",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %detail,
            "request rejected"
        );
    }

    let mut context = Context::new();
    context.insert("message", interface.user_message());
    context.insert("correlation_id", interface.correlation_id());
    let body = templates
        .render("error.html", &context)
        .unwrap_or_else(|_| format!("<h1>{}</h1>", interface.user_message()));
    (status, Html(body))
}
