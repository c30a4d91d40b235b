use axum::headers::Cookie;
use axum::{Extension, TypedHeader};
use serde::Serialize;

use crate::models::{PublicUser, UserRecord, UserRole};
use crate::store::{SharedStore, Store};
use crate::{proceeds, session, Error, Payload};

pub fn session_cookie(cookies: &Option<TypedHeader<Cookie>>) -> Option<String> {
    cookies
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(session::SESSION_COOKIE).map(str::to_string))
}

fn unauthorized() -> Error {
    Error::AuthenticationFailure {
        message: "Unauthorized".to_string(),
    }
}

/// First gate: resolves the request's session to an identity and hands it
/// to the handler. No session, an expired one, or a destroyed one all fail
/// the same way.
pub async fn require_authenticated(
    store: &dyn Store,
    ssid: Option<String>,
) -> Result<UserRecord, Error> {
    let ssid = match ssid {
        Some(ssid) if !ssid.is_empty() => ssid,
        _ => return Err(unauthorized()),
    };
    match session::resolve(store, &ssid).await? {
        Some(user) => Ok(user),
        None => Err(unauthorized()),
    }
}

/// Second gate; only meaningful after `require_authenticated` succeeded.
pub fn require_role(user: &UserRecord, role: UserRole) -> Result<(), Error> {
    if user.role == role {
        Ok(())
    } else {
        Err(Error::Forbidden {
            message: "Forbidden".to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectedReply {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReply {
    pub message: String,
}

pub async fn protected_route(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(store): Extension<SharedStore>,
) -> Payload<ProtectedReply> {
    let user = require_authenticated(&*store, session_cookie(&cookies)).await?;
    proceeds(ProtectedReply {
        message: "This is a protected route".to_string(),
        user: PublicUser::from(&user),
    })
}

pub async fn admin_dashboard(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(store): Extension<SharedStore>,
) -> Payload<DashboardReply> {
    let user = require_authenticated(&*store, session_cookie(&cookies)).await?;
    require_role(&user, UserRole::Admin)?;
    proceeds(DashboardReply {
        message: "Admin dashboard data".to_string(),
    })
}
