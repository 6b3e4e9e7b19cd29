//! Portal launch authentication.
//!
//! Bitrix24 opens the application with a form POST carrying `AUTH_ID` and
//! friends. Later navigation inside the iframe has only the session cookie
//! that was issued on launch. Which of the two applies is decided per request
//! by [`select_auth_strategy`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const SESSION_COOKIE_NAME: &str = "b24desk_session";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Credentials come from the launch parameters; a fresh cookie is issued.
    StartParameters,
    /// Credentials come from a previously issued session cookie.
    Cookie,
}

pub fn select_auth_strategy(has_auth_id: bool) -> AuthStrategy {
    if has_auth_id {
        AuthStrategy::StartParameters
    } else {
        AuthStrategy::Cookie
    }
}

/// What the portal hands over on launch, trimmed to what the REST client needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub member_id: Option<String>,
    pub domain: String,
}

/// Raw launch fields, as Bitrix24 names them. Query string and form body
/// both deserialize into this.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LaunchParams {
    #[serde(rename = "AUTH_ID")]
    pub auth_id: Option<String>,
    #[serde(rename = "REFRESH_ID")]
    pub refresh_id: Option<String>,
    #[serde(rename = "AUTH_EXPIRES")]
    pub auth_expires: Option<String>,
    pub member_id: Option<String>,
    #[serde(rename = "DOMAIN")]
    pub domain: Option<String>,
}

impl LaunchParams {
    pub fn has_auth_id(&self) -> bool {
        non_empty(self.auth_id.as_deref()).is_some()
    }

    /// Launch fields win over `fallback` field by field.
    pub fn merged_with(self, fallback: LaunchParams) -> LaunchParams {
        LaunchParams {
            auth_id: self.auth_id.or(fallback.auth_id),
            refresh_id: self.refresh_id.or(fallback.refresh_id),
            auth_expires: self.auth_expires.or(fallback.auth_expires),
            member_id: self.member_id.or(fallback.member_id),
            domain: self.domain.or(fallback.domain),
        }
    }

    pub fn into_credentials(
        self,
        default_domain: Option<&str>,
    ) -> Result<PortalCredentials, AuthError> {
        let access_token =
            non_empty(self.auth_id.as_deref()).ok_or(AuthError::MissingLaunchField("AUTH_ID"))?;
        let domain = non_empty(self.domain.as_deref())
            .or_else(|| non_empty(default_domain))
            .ok_or(AuthError::MissingLaunchField("DOMAIN"))?;

        Ok(PortalCredentials {
            access_token: access_token.to_string(),
            refresh_token: non_empty(self.refresh_id.as_deref()).map(str::to_string),
            expires_in: self.auth_expires.as_deref().and_then(|raw| raw.trim().parse().ok()),
            member_id: non_empty(self.member_id.as_deref()).map(str::to_string),
            domain: domain.to_string(),
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("launch request is missing `{0}`")]
    MissingLaunchField(&'static str),
    #[error("session cookie is missing")]
    MissingCookie,
    #[error("session cookie is malformed")]
    MalformedCookie,
    #[error("session cookie signature does not match")]
    BadSignature,
    #[error("session key is unusable")]
    InvalidKey,
}

/// Signs and verifies the session cookie: `base64url(json).base64url(hmac)`.
#[derive(Clone)]
pub struct SessionSigner {
    secret: SecretString,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| AuthError::InvalidKey)
    }

    pub fn sign(&self, credentials: &PortalCredentials) -> Result<String, AuthError> {
        let payload = serde_json::to_vec(credentials).map_err(|_| AuthError::MalformedCookie)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), URL_SAFE_NO_PAD.encode(signature)))
    }

    pub fn verify(&self, cookie_value: &str) -> Result<PortalCredentials, AuthError> {
        let (payload, signature) =
            cookie_value.trim().split_once('.').ok_or(AuthError::MalformedCookie)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| AuthError::MalformedCookie)?;
        let signature =
            URL_SAFE_NO_PAD.decode(signature).map_err(|_| AuthError::MalformedCookie)?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| AuthError::BadSignature)?;

        serde_json::from_slice(&payload).map_err(|_| AuthError::MalformedCookie)
    }
}

/// Finds `name` in a raw `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Resolves credentials for one request.
pub fn authenticate(
    launch: LaunchParams,
    cookie_header: Option<&str>,
    signer: &SessionSigner,
    default_domain: Option<&str>,
) -> Result<(AuthStrategy, PortalCredentials), AuthError> {
    match select_auth_strategy(launch.has_auth_id()) {
        AuthStrategy::StartParameters => {
            let credentials = launch.into_credentials(default_domain)?;
            Ok((AuthStrategy::StartParameters, credentials))
        }
        AuthStrategy::Cookie => {
            let value = cookie_header
                .and_then(|header| cookie_value(header, SESSION_COOKIE_NAME))
                .ok_or(AuthError::MissingCookie)?;
            Ok((AuthStrategy::Cookie, signer.verify(value)?))
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{
        authenticate, cookie_value, select_auth_strategy, AuthError, AuthStrategy, LaunchParams,
        PortalCredentials, SessionSigner, SESSION_COOKIE_NAME,
    };

    fn signer() -> SessionSigner {
        SessionSigner::new("0123456789abcdef-session".to_string().into())
    }

    fn credentials() -> PortalCredentials {
        PortalCredentials {
            access_token: "token-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_in: Some(3600),
            member_id: Some("member-abc".to_string()),
            domain: "example.bitrix24.ru".to_string(),
        }
    }

    #[test]
    fn auth_id_selects_start_parameters() {
        assert_eq!(select_auth_strategy(true), AuthStrategy::StartParameters);
        assert_eq!(select_auth_strategy(false), AuthStrategy::Cookie);
    }

    #[test]
    fn blank_auth_id_does_not_count() {
        let launch = LaunchParams { auth_id: Some("  ".to_string()), ..LaunchParams::default() };
        assert!(!launch.has_auth_id());
    }

    #[test]
    fn signed_cookie_verifies() {
        let signer = signer();
        let cookie = signer.sign(&credentials()).expect("sign");

        assert_eq!(signer.verify(&cookie), Ok(credentials()));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let signer = signer();
        let cookie = signer.sign(&credentials()).expect("sign");
        let (_, signature) = cookie.split_once('.').expect("separator");
        let forged = SessionSigner::new("another-secret-value-xx".to_string().into())
            .sign(&PortalCredentials { access_token: "stolen".to_string(), ..credentials() })
            .expect("sign");
        let (forged_payload, _) = forged.split_once('.').expect("separator");

        assert_eq!(
            signer.verify(&format!("{forged_payload}.{signature}")),
            Err(AuthError::BadSignature)
        );
        assert_eq!(signer.verify("garbage"), Err(AuthError::MalformedCookie));
    }

    #[test]
    fn cookie_lookup_handles_multiple_pairs() {
        let header = format!("theme=dark; {SESSION_COOKIE_NAME}=abc.def; other=1");
        assert_eq!(cookie_value(&header, SESSION_COOKIE_NAME), Some("abc.def"));
        assert_eq!(cookie_value("theme=dark", SESSION_COOKIE_NAME), None);
    }

    #[test]
    fn launch_params_become_credentials() {
        let launch = LaunchParams {
            auth_id: Some("token-9".to_string()),
            refresh_id: Some("refresh-9".to_string()),
            auth_expires: Some("3600".to_string()),
            member_id: Some("m-1".to_string()),
            domain: None,
        };

        let (strategy, credentials) =
            authenticate(launch, None, &signer(), Some("fallback.bitrix24.ru")).expect("auth");

        assert_eq!(strategy, AuthStrategy::StartParameters);
        assert_eq!(credentials.access_token, "token-9");
        assert_eq!(credentials.domain, "fallback.bitrix24.ru");
        assert_eq!(credentials.expires_in, Some(3600));
    }

    #[test]
    fn missing_domain_is_reported() {
        let launch = LaunchParams { auth_id: Some("t".to_string()), ..LaunchParams::default() };

        assert_eq!(
            authenticate(launch, None, &signer(), None),
            Err(AuthError::MissingLaunchField("DOMAIN"))
        );
    }

    #[test]
    fn cookie_strategy_requires_cookie() {
        let signer = signer();
        assert_eq!(
            authenticate(LaunchParams::default(), None, &signer, None),
            Err(AuthError::MissingCookie)
        );

        let cookie = signer.sign(&credentials()).expect("sign");
        let header = format!("{SESSION_COOKIE_NAME}={cookie}");
        let (strategy, resolved) =
            authenticate(LaunchParams::default(), Some(&header), &signer, None).expect("auth");

        assert_eq!(strategy, AuthStrategy::Cookie);
        assert_eq!(resolved, credentials());
    }

    #[test]
    fn query_fields_fill_gaps_in_form_fields() {
        let form = LaunchParams { auth_id: Some("form".to_string()), ..LaunchParams::default() };
        let query = LaunchParams {
            auth_id: Some("query".to_string()),
            domain: Some("q.bitrix24.ru".to_string()),
            ..LaunchParams::default()
        };

        let merged = form.merged_with(query);

        assert_eq!(merged.auth_id.as_deref(), Some("form"));
        assert_eq!(merged.domain.as_deref(), Some("q.bitrix24.ru"));
    }
}
