//! Portal authentication for every page except the public QR view.
//!
//! A request carrying `AUTH_ID` (form body or query) is a launch from the
//! portal: its credentials are used directly and a signed session cookie is
//! issued. Any other request must present that cookie.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use b24desk_core::auth::{
    authenticate, AuthStrategy, LaunchParams, PortalCredentials, SESSION_COOKIE_NAME,
};
use b24desk_core::errors::ApplicationError;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::pages::error_page;

/// Launch forms are small; anything bigger is not a launch.
const MAX_LAUNCH_FORM_BYTES: usize = 64 * 1024;

/// Authenticated portal context, available to handlers as an extension.
#[derive(Clone, Debug)]
pub struct PortalSession {
    pub strategy: AuthStrategy,
    pub credentials: PortalCredentials,
}

impl PortalSession {
    /// The portal opened the page; a POST body holds launch fields, not a form.
    pub fn is_launch(&self) -> bool {
        self.strategy == AuthStrategy::StartParameters
    }
}

pub async fn require_portal_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let query_params = parts.uri.query().map(parse_launch).unwrap_or_default();
    let (form_params, body) = if is_urlencoded_form(&parts.headers) {
        match to_bytes(body, MAX_LAUNCH_FORM_BYTES).await {
            Ok(bytes) => (parse_launch_bytes(&bytes), Body::from(bytes)),
            Err(error) => {
                return error_page(
                    &state.templates,
                    ApplicationError::Unauthenticated(format!("unreadable form body: {error}")),
                )
                .into_response();
            }
        }
    } else {
        (LaunchParams::default(), body)
    };

    let cookie_header = parts.headers.get(header::COOKIE).and_then(|value| value.to_str().ok());
    let outcome = authenticate(
        form_params.merged_with(query_params),
        cookie_header,
        &state.signer,
        state.config.bitrix.portal_domain.as_deref(),
    );

    let (strategy, credentials) = match outcome {
        Ok(authenticated) => authenticated,
        Err(error) => {
            return error_page(&state.templates, ApplicationError::Unauthenticated(error.to_string()))
                .into_response();
        }
    };

    debug!(
        event_name = "portal.session.authenticated",
        strategy = ?strategy,
        domain = %credentials.domain,
        path = %parts.uri.path(),
        "portal request authenticated"
    );

    let session_cookie = match strategy {
        AuthStrategy::StartParameters => session_cookie(&state, &credentials),
        AuthStrategy::Cookie => None,
    };

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(PortalSession { strategy, credentials });

    let mut response = next.run(request).await;
    if let Some(cookie) = session_cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

fn parse_launch(raw: &str) -> LaunchParams {
    serde_urlencoded::from_str(raw).unwrap_or_default()
}

fn parse_launch_bytes(raw: &[u8]) -> LaunchParams {
    serde_urlencoded::from_bytes(raw).unwrap_or_default()
}

fn is_urlencoded_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

// The app runs inside the portal iframe, so the cookie must be cross-site.
fn session_cookie(state: &AppState, credentials: &PortalCredentials) -> Option<HeaderValue> {
    let signed = match state.signer.sign(credentials) {
        Ok(signed) => signed,
        Err(error) => {
            warn!(
                event_name = "portal.session.sign_failed",
                error = %error,
                "could not sign session cookie"
            );
            return None;
        }
    };

    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={signed}; Path=/; HttpOnly; Secure; SameSite=None"
    ))
    .ok()
}
