use std::sync::Arc;

use axum::extract::Query;
use axum::headers::Cookie;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, TypedHeader};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, GoogleConfig};
use crate::models::{NewUser, UserPatch, UserRecord, UserRole};
use crate::store::{SharedStore, Store};
use crate::{session, Error};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const STATE_COOKIE: &str = "oauth_state";
const STATE_TTL_SECS: i64 = 600;

/// What the provider asserts about the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleAssertion {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleAssertion {
    fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("user-{}", self.id),
        }
    }

    fn placeholder_email(&self) -> String {
        format!("user-{}@placeholder.invalid", self.id)
    }
}

/// Exchanges a provider assertion for a local identity. Ordered, first
/// match wins:
/// 1. known federated id -> the linked identity, unchanged;
/// 2. known email -> link the federated id onto that identity;
/// 3. otherwise auto-provision a student account.
pub async fn complete_federated_login(
    store: &dyn Store,
    assertion: &GoogleAssertion,
) -> Result<UserRecord, Error> {
    if let Some(user) = store.get_user_by_google_id(&assertion.id).await? {
        return Ok(user);
    }

    if let Some(email) = &assertion.email {
        if let Some(user) = store.get_user_by_email(email).await? {
            let linked = store
                .update_user(
                    user.id,
                    UserPatch {
                        google_id: Some(assertion.id.clone()),
                        ..UserPatch::default()
                    },
                )
                .await?;
            log::info!("linked google id to existing user {}", linked.id);
            return Ok(linked);
        }
    }

    let email = assertion
        .email
        .clone()
        .unwrap_or_else(|| assertion.placeholder_email());
    let created = store
        .create_user(NewUser {
            email,
            password_hash: None,
            name: assertion.display_name(),
            profile_image_url: assertion.picture.clone(),
            role: UserRole::Student,
            google_id: Some(assertion.id.clone()),
        })
        .await?;
    log::info!("provisioned student {} via google login", created.id);
    Ok(created)
}

fn state_cookie_header(state: &str, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        STATE_COOKIE,
        state,
        STATE_TTL_SECS,
        if secure { "; Secure" } else { "" }
    )
}

fn clear_state_cookie_header(secure: bool) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        STATE_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}

fn internal(kind: &'static str, message: String) -> Error {
    Error::InternalError { kind, message }
}

/// `GET /api/auth/google` — sends the browser to Google's consent screen.
pub async fn google_login(
    Extension(config): Extension<Arc<Config>>,
) -> Result<Response, Error> {
    let google = match &config.google {
        Some(google) => google,
        None => {
            return Err(Error::NotFound {
                message: "Google login is not configured".to_string(),
            })
        }
    };

    let state = Uuid::new_v4().to_string();
    let url = reqwest::Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", google.client_id.as_str()),
            ("redirect_uri", google.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state.as_str()),
        ],
    )
    .map_err(|e| internal("OAuthError", e.to_string()))?;

    let uri = url
        .as_str()
        .parse::<Uri>()
        .map_err(|e| internal("OAuthError", e.to_string()))?;
    let mut response = Redirect::to(uri.to_string().as_str()).into_response();
    let cookie = state_cookie_header(&state, config.cookie_secure);
    let value =
        HeaderValue::from_str(&cookie).map_err(|e| internal("OAuthError", e.to_string()))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn fetch_assertion(
    http: &reqwest::Client,
    google: &GoogleConfig,
    code: &str,
) -> Result<GoogleAssertion, Error> {
    let token: TokenResponse = http
        .post(TOKEN_URL)
        .form(&[
            ("code", code),
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.as_str()),
            ("redirect_uri", google.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let assertion: GoogleAssertion = http
        .get(USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(assertion)
}

async fn run_callback(
    query: CallbackQuery,
    cookies: &Option<TypedHeader<Cookie>>,
    config: &Config,
    http: &reqwest::Client,
    store: &dyn Store,
) -> Result<session::EstablishedSession, Error> {
    let google = config.google.as_ref().ok_or_else(|| {
        internal("OAuthError", "google login is not configured".to_string())
    })?;

    if let Some(error) = query.error {
        return Err(internal("OAuthError", format!("provider error: {}", error)));
    }

    let expected_state = cookies
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(STATE_COOKIE).map(str::to_string));
    match (&query.state, &expected_state) {
        (Some(got), Some(expected)) if got == expected => {}
        _ => return Err(internal("OAuthError", "state mismatch".to_string())),
    }

    let code = query
        .code
        .ok_or_else(|| internal("OAuthError", "missing authorization code".to_string()))?;

    let assertion = fetch_assertion(http, google, &code).await?;
    let user = complete_federated_login(store, &assertion).await?;
    session::establish(store, user.id).await
}

/// `GET /api/auth/google/callback` — completes the flow. Success lands on
/// the dashboard with a fresh session cookie; any failure lands on /auth.
pub async fn google_callback(
    Query(query): Query<CallbackQuery>,
    cookies: Option<TypedHeader<Cookie>>,
    Extension(config): Extension<Arc<Config>>,
    Extension(http): Extension<reqwest::Client>,
    Extension(store): Extension<SharedStore>,
) -> Response {
    match run_callback(query, &cookies, &config, &http, &*store).await {
        Ok(established) => {
            let mut response = Redirect::to("/dashboard").into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&session::session_cookie_header(
                &established.ssid,
                config.cookie_secure,
            )) {
                headers.append(SET_COOKIE, value);
            }
            if let Ok(value) =
                HeaderValue::from_str(&clear_state_cookie_header(config.cookie_secure))
            {
                headers.append(SET_COOKIE, value);
            }
            response
        }
        Err(err) => {
            log::warn!("google callback failed: {:?}", err);
            Redirect::to("/auth").into_response()
        }
    }
}
