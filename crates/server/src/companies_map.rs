use axum::extract::{Extension, State};
use b24desk_bitrix::fetch;
use b24desk_core::geo::{pending_markers, MapMarker};
use secrecy::ExposeSecret;
use tera::Context;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::pages::{error_page, render, PageResult};
use crate::session::PortalSession;

pub async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
) -> PageResult {
    let mut context = Context::new();

    let (Some(api_key), Some(geocoder)) = (&state.config.geocoder.api_key, &state.geocoder) else {
        warn!(event_name = "companies_map.api_key_missing", "geocoder api key is not configured");
        context.insert(
            "error",
            "Не задан API-ключ Яндекс.Карт. Укажите geocoder.api_key или YANDEX_API_KEY.",
        );
        return render(&state.templates, "companies_map/index.html", &context);
    };

    let api = state.connector.connect(&session.credentials);
    let (companies, addresses) = fetch::companies_with_addresses(api.as_ref())
        .await
        .map_err(|error| error_page(&state.templates, error))?;

    let mut markers: Vec<MapMarker> = Vec::new();
    for pending in pending_markers(&companies, &addresses) {
        match geocoder.locate(&pending.address).await {
            Ok(Some(coordinates)) => markers.push(pending.locate(coordinates)),
            Ok(None) => {
                debug!(
                    event_name = "companies_map.address_unmatched",
                    company_id = %pending.company.id,
                    "geocoder found no match"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "companies_map.geocode_failed",
                    company_id = %pending.company.id,
                    error = %error,
                    "address skipped"
                );
            }
        }
    }

    info!(
        event_name = "companies_map.markers_built",
        companies = companies.len(),
        markers = markers.len(),
        "company markers built"
    );
    context.insert("yandex_api_key", api_key.expose_secret());
    context.insert("companies", &markers);
    render(&state.templates, "companies_map/index.html", &context)
}
