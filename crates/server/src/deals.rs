use std::collections::HashMap;

use axum::extract::{Extension, Form, State};
use b24desk_bitrix::{fetch, BitrixApi};
use b24desk_core::deals::{lead_source_options, DealForm};
use tera::Context;
use tracing::{info, warn};

use crate::app::AppState;
use crate::pages::{error_page, render, PageResult};
use crate::session::PortalSession;

/// Outcome banner above the deal list.
#[derive(Debug, Default)]
struct Notice {
    success: Option<String>,
    error: Option<String>,
}

impl Notice {
    fn success(message: String) -> Self {
        Self { success: Some(message), error: None }
    }

    fn error(message: String) -> Self {
        Self { success: None, error: Some(message) }
    }
}

pub async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
) -> PageResult {
    let api = state.connector.connect(&session.credentials);
    deals_page(&state, api.as_ref(), Notice::default(), DealForm::default()).await
}

pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
    Form(input): Form<HashMap<String, String>>,
) -> PageResult {
    let api = state.connector.connect(&session.credentials);
    if session.is_launch() {
        return deals_page(&state, api.as_ref(), Notice::default(), DealForm::default()).await;
    }

    let field = |name: &str| input.get(name).cloned().unwrap_or_default();
    let form = DealForm {
        title: field("title"),
        lead_source: field(&state.config.deals.custom_field_name),
        opportunity: field("opportunity"),
    };

    let (notice, sticky) = match form.validate() {
        Err(invalid) => (Notice::error(invalid.to_string()), form),
        Ok(deal) => {
            let fields = deal.to_fields(&state.config.deals);
            match fetch::add_deal(api.as_ref(), fields).await {
                Ok(deal_id) => {
                    info!(event_name = "deals.created", deal_id = %deal_id, "deal created");
                    (Notice::success(format!("Сделка #{deal_id} успешно создана!")), DealForm::default())
                }
                Err(error) if error.is_expired_token() => {
                    return Err(error_page(&state.templates, error));
                }
                Err(error) => {
                    warn!(event_name = "deals.create_failed", error = %error, "deal creation failed");
                    (Notice::error(format!("Ошибка Bitrix24: {}", error.description())), form)
                }
            }
        }
    };

    deals_page(&state, api.as_ref(), notice, sticky).await
}

async fn deals_page(
    state: &AppState,
    api: &dyn BitrixApi,
    mut notice: Notice,
    form: DealForm,
) -> PageResult {
    let deals_config = &state.config.deals;

    let user = fetch::current_user(api).await.map_err(|error| error_page(&state.templates, error))?;
    let deals = fetch::recent_open_deals(api, deals_config.recent_limit)
        .await
        .map_err(|error| error_page(&state.templates, error))?;

    let options = match fetch::deal_fields(api).await {
        Ok(fields) => match lead_source_options(&fields, &deals_config.custom_field_name) {
            Some(options) => options,
            None => {
                warn!(
                    event_name = "deals.custom_field_missing",
                    field = %deals_config.custom_field_name,
                    "lead source field not found or has no items"
                );
                notice.error.get_or_insert_with(|| {
                    format!("Не удалось найти кастомное поле {}.", deals_config.custom_field_name)
                });
                Vec::new()
            }
        },
        Err(error) => {
            warn!(event_name = "deals.fields_failed", error = %error, "could not load deal fields");
            notice
                .error
                .get_or_insert_with(|| "Не удалось загрузить описание полей сделки.".to_string());
            Vec::new()
        }
    };

    let mut context = Context::new();
    let user_name = if user.name.is_empty() { "Неизвестно" } else { user.name.as_str() };
    context.insert("user_name", user_name);
    context.insert("deals", &deals);
    context.insert("success_message", &notice.success);
    context.insert("error_message", &notice.error);
    context.insert("custom_field_name", &deals_config.custom_field_name);
    context.insert("lead_source_options", &options);
    context.insert("form", &form);
    render(&state.templates, "deals/index.html", &context)
}
