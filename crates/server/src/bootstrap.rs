use std::sync::Arc;
use std::time::Duration;

use b24desk_bitrix::{BitrixClient, BitrixError, Geocoder, YandexGeocoder};
use b24desk_core::auth::SessionSigner;
use b24desk_core::config::{AppConfig, ConfigError, LoadOptions};
use b24desk_db::{connect_with_settings, migrations, DbPool, SqlProductQrRepository};
use thiserror::Error;
use tracing::info;

use crate::app::{AppState, HttpPortalConnector};
use crate::templates::init_templates;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client setup failed: {0}")]
    HttpClient(#[source] BitrixError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let portal_http =
        BitrixClient::http_client(Duration::from_secs(config.bitrix.request_timeout_secs))
            .map_err(BootstrapError::HttpClient)?;

    let geocoder: Option<Arc<dyn Geocoder>> = match &config.geocoder.api_key {
        Some(api_key) => {
            let http = BitrixClient::http_client(Duration::from_secs(config.geocoder.timeout_secs))
                .map_err(BootstrapError::HttpClient)?;
            Some(Arc::new(YandexGeocoder::new(http, config.geocoder.base_url.clone(), api_key.clone())))
        }
        None => None,
    };
    info!(
        event_name = "system.bootstrap.integrations_ready",
        correlation_id = "bootstrap",
        geocoder_enabled = geocoder.is_some(),
        "portal and geocoder clients initialized"
    );

    let config = Arc::new(config);
    let state = AppState {
        templates: init_templates(&config.server.templates_dir),
        signer: SessionSigner::new(config.bitrix.session_secret.clone()),
        connector: Arc::new(HttpPortalConnector::new(portal_http)),
        geocoder,
        qr_codes: Arc::new(SqlProductQrRepository::new(db_pool.clone())),
        config: config.clone(),
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use b24desk_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    const SESSION_SECRET: &str = "bootstrap-test-secret-0123";

    fn overrides(database_url: &str, session_secret: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                session_secret: Some(session_secret.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_session_secret() {
        let result = bootstrap(overrides("sqlite::memory:", "short")).await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("bitrix.session_secret"), "unexpected: {message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_state() {
        let app = bootstrap(overrides("sqlite::memory:", SESSION_SECRET))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'product_qr'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 1);
        assert!(app.state.templates.get_template_names().any(|name| name == "error.html"));

        app.db_pool.close().await;
    }
}
