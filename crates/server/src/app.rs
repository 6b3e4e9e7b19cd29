use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use b24desk_bitrix::{BitrixApi, BitrixClient, Geocoder};
use b24desk_core::auth::{PortalCredentials, SessionSigner};
use b24desk_core::config::AppConfig;
use b24desk_db::ProductQrRepository;
use tera::Tera;
use tower_http::services::ServeDir;

use crate::{companies_map, contacts, deals, employees, home, product_qr, session};

/// Upload cap for contact spreadsheets.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Opens a REST client for the portal a request is authenticated against.
pub trait PortalConnector: Send + Sync {
    fn connect(&self, credentials: &PortalCredentials) -> Arc<dyn BitrixApi>;
}

pub struct HttpPortalConnector {
    http: reqwest::Client,
}

impl HttpPortalConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl PortalConnector for HttpPortalConnector {
    fn connect(&self, credentials: &PortalCredentials) -> Arc<dyn BitrixApi> {
        Arc::new(BitrixClient::for_portal(self.http.clone(), credentials))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub templates: Arc<Tera>,
    pub signer: SessionSigner,
    pub connector: Arc<dyn PortalConnector>,
    /// Present only when a geocoder API key is configured.
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub qr_codes: Arc<dyn ProductQrRepository>,
}

pub fn router(state: AppState) -> Router {
    let portal = Router::new()
        .route("/", get(home::index).post(home::index))
        .route("/deals/", get(deals::index).post(deals::create))
        .route("/employees/", get(employees::index).post(employees::index))
        .route("/map/", get(companies_map::index).post(companies_map::index))
        .route("/contacts/", get(contacts::index).post(contacts::index))
        .route("/contacts/export/", get(contacts::export_form).post(contacts::export))
        .route(
            "/contacts/import/",
            get(contacts::import_form)
                .post(contacts::import)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/qr/", get(product_qr::index).post(product_qr::generate))
        .route_layer(middleware::from_fn_with_state(state.clone(), session::require_portal_session));

    let static_dir = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .merge(portal)
        .route("/qr/view/{id}/", get(product_qr::view))
        .nest_service("/static", static_dir)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use b24desk_bitrix::testing::ScriptedApi;
    use b24desk_bitrix::BitrixApi;
    use b24desk_core::auth::{PortalCredentials, SessionSigner, SESSION_COOKIE_NAME};
    use b24desk_core::config::AppConfig;
    use b24desk_db::{InMemoryProductQrRepository, ProductQrRepository};
    use serde_json::json;
    use tower::ServiceExt;

    use super::{router, AppState, PortalConnector};
    use crate::templates::init_templates;

    const SECRET: &str = "router-test-session-secret";

    struct FixedPortal(Arc<ScriptedApi>);

    impl PortalConnector for FixedPortal {
        fn connect(&self, _credentials: &PortalCredentials) -> Arc<dyn BitrixApi> {
            self.0.clone()
        }
    }

    struct Harness {
        router: Router,
        api: Arc<ScriptedApi>,
        qr_codes: Arc<InMemoryProductQrRepository>,
        cookie: String,
    }

    fn harness(api: ScriptedApi) -> Harness {
        let mut config = AppConfig::default();
        config.bitrix.session_secret = SECRET.to_string().into();
        config.bitrix.app_base_url = "https://app.example.test".to_string();

        let api = Arc::new(api);
        let qr_codes = Arc::new(InMemoryProductQrRepository::default());
        let signer = SessionSigner::new(SECRET.to_string().into());
        let credentials = PortalCredentials {
            access_token: "token-1".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            member_id: Some("member-1".to_string()),
            domain: "example.bitrix24.ru".to_string(),
        };
        let cookie = format!(
            "{SESSION_COOKIE_NAME}={}",
            signer.sign(&credentials).expect("cookie signs")
        );

        let state = AppState {
            config: Arc::new(config),
            templates: init_templates("/nonexistent/b24desk-templates"),
            signer,
            connector: Arc::new(FixedPortal(api.clone())),
            geocoder: None,
            qr_codes: qr_codes.clone(),
        };
        Harness { router: router(state), api, qr_codes, cookie }
    }

    fn form_post(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    fn deals_portal() -> ScriptedApi {
        ScriptedApi::default()
            .with("user.current", Ok(json!({"ID": "3", "NAME": "Ольга", "LAST_NAME": "Ким"})))
            .with("crm.deal.list", Ok(json!([])))
    }

    #[tokio::test]
    async fn portal_pages_require_a_session() {
        let harness = harness(ScriptedApi::default());

        let response = harness
            .router
            .oneshot(Request::get("/deals/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Срок действия токена истек"));
    }

    #[tokio::test]
    async fn launch_post_issues_session_cookie() {
        let harness = harness(ScriptedApi::default());

        let response = harness
            .router
            .oneshot(form_post(
                "/",
                None,
                "AUTH_ID=token-9&REFRESH_ID=r&AUTH_EXPIRES=3600&member_id=m&DOMAIN=example.bitrix24.ru",
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE_NAME}=")), "cookie: {cookie}");
        assert!(cookie.contains("SameSite=None"));
    }

    #[tokio::test]
    async fn session_cookie_opens_the_deals_page() {
        let harness = harness(deals_portal());

        let response = harness
            .router
            .oneshot(
                Request::get("/deals/")
                    .header(header::COOKIE, &harness.cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(harness.api.called("crm.deal.list"));
    }

    #[tokio::test]
    async fn invalid_deal_is_reported_inline_without_portal_write() {
        let harness = harness(deals_portal());

        let response = harness
            .router
            .oneshot(form_post("/deals/", Some(&harness.cookie), "title=&opportunity=abc"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Название сделки обязательно"));
        assert!(!harness.api.called("crm.deal.add"));
    }

    #[tokio::test]
    async fn launch_post_to_a_form_page_renders_the_form() {
        let harness = harness(deals_portal());

        let response = harness
            .router
            .oneshot(form_post("/deals/", None, "AUTH_ID=token-9&DOMAIN=example.bitrix24.ru&title=x"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!harness.api.called("crm.deal.add"));
    }

    #[tokio::test]
    async fn generated_qr_code_is_publicly_viewable() {
        let harness = harness(
            ScriptedApi::default()
                .with("crm.product.get", Ok(json!({"ID": "42", "NAME": "Кресло", "PRICE": "990"}))),
        );

        let response = harness
            .router
            .clone()
            .oneshot(form_post("/qr/", Some(&harness.cookie), "product_id=42"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("Кресло"));
        assert!(page.contains("data:image/svg+xml;base64,"));

        let stored = harness.qr_codes.list_recent(1).await.expect("recent");
        let record = stored.first().expect("code stored");
        assert_eq!(record.member_id.as_deref(), Some("member-1"));

        let view = harness
            .router
            .oneshot(
                Request::get(format!("/qr/view/{}/", record.id))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(view.status(), StatusCode::OK);
        assert!(body_text(view).await.contains("Кресло"));
    }

    #[tokio::test]
    async fn non_numeric_product_id_is_rejected_before_portal_call() {
        let harness = harness(ScriptedApi::default());

        let response = harness
            .router
            .oneshot(form_post("/qr/", Some(&harness.cookie), "product_id=12a"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("допускаются только цифры"));
        assert!(!harness.api.called("crm.product.get"));
    }

    #[tokio::test]
    async fn unknown_qr_code_is_not_found() {
        let harness = harness(ScriptedApi::default());

        for uri in ["/qr/view/9a4c2a4e-3f7b-4d2e-9a55-0c1d2e3f4a5b/", "/qr/view/not-a-uuid/"] {
            let response = harness
                .router
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
