//! Readiness probe served on its own port.
//!
//! Only the QR store decides readiness. Optional integrations are reported
//! as configured or not and never turn the probe red.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use b24desk_core::config::AppConfig;
use b24desk_db::{migrations, DbPool};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Ready,
    Degraded,
    Configured,
    Unconfigured,
}

#[derive(Clone, Debug, Serialize)]
pub struct Component {
    pub name: &'static str,
    pub state: ComponentState,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub checked_at: String,
    pub components: Vec<Component>,
}

#[cfg(test)]
impl Readiness {
    fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|component| component.name == name)
    }
}

/// Which optional integrations were configured at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Integrations {
    pub portal_app: bool,
    pub webhook: bool,
    pub geocoder: bool,
}

impl Integrations {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            portal_app: config.bitrix.client_id.is_some() && config.bitrix.client_secret.is_some(),
            webhook: config.bitrix.webhook_url.is_some(),
            geocoder: config.geocoder.api_key.is_some(),
        }
    }

    fn components(self) -> [Component; 3] {
        [
            presence("portal_app", self.portal_app, "bitrix.client_id / bitrix.client_secret"),
            presence("webhook", self.webhook, "bitrix.webhook_url"),
            presence("geocoder", self.geocoder, "geocoder.api_key"),
        ]
    }
}

fn presence(name: &'static str, configured: bool, keys: &str) -> Component {
    let (state, detail) = if configured {
        (ComponentState::Configured, format!("{keys} set"))
    } else {
        (ComponentState::Unconfigured, format!("{keys} not set"))
    };
    Component { name, state, detail }
}

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    integrations: Integrations,
}

pub fn router(db_pool: DbPool, integrations: Integrations) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, integrations })
}

pub async fn spawn(config: &AppConfig, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{}:{}", config.server.bind_address, config.server.health_check_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let integrations = Integrations::from_config(config);

    info!(
        event_name = "system.health.started",
        correlation_id = "bootstrap",
        address = %address,
        webhook = integrations.webhook,
        geocoder = integrations.geocoder,
        "health endpoint listening"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool, integrations)).await {
            error!(
                event_name = "system.health.failed",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint stopped"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<Readiness>) {
    let store = qr_store(&state.db_pool).await;
    let ready = store.state == ComponentState::Ready;
    if !ready {
        warn!(event_name = "system.health.degraded", detail = %store.detail, "qr store not ready");
    }

    let mut components = vec![store];
    components.extend(state.integrations.components());
    let readiness = Readiness { ready, checked_at: Utc::now().to_rfc3339(), components };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(readiness))
}

async fn qr_store(pool: &DbPool) -> Component {
    let (state, detail) = match migrations::schema_ready(pool).await {
        Ok(true) => (ComponentState::Ready, "schema migrated".to_string()),
        Ok(false) => {
            (ComponentState::Degraded, "migrations pending, run `b24desk migrate`".to_string())
        }
        Err(error) => (ComponentState::Degraded, format!("database unreachable: {error}")),
    };
    Component { name: "qr_store", state, detail }
}
