use chrono::{DateTime, Duration, Utc};
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

use crate::models::{SessionPayload, SessionRecord, UserRecord};
use crate::store::Store;
use crate::Error;

pub const SESSION_COOKIE: &str = "sid";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Handle returned to the transport boundary after a successful login,
/// registration or federated callback.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub ssid: String,
    pub expires_at: DateTime<Utc>,
}

fn generate_token() -> String {
    let bytes: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub async fn establish(store: &dyn Store, user_id: i32) -> Result<EstablishedSession, Error> {
    let ssid = generate_token();
    let sess = postcard::to_allocvec(&SessionPayload { user_id })?;
    let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);
    store
        .insert_session(&SessionRecord {
            ssid: ssid.clone(),
            sess,
            expires_at,
        })
        .await?;
    log::debug!("session established for user {}", user_id);
    Ok(EstablishedSession { ssid, expires_at })
}

/// Resolves an opaque session id to its identity. Expiration is re-checked
/// on every call; an expired row is deleted and treated as absent.
pub async fn resolve(store: &dyn Store, ssid: &str) -> Result<Option<UserRecord>, Error> {
    if ssid.is_empty() {
        return Ok(None);
    }
    let session = match store.get_session(ssid).await? {
        Some(session) => session,
        None => return Ok(None),
    };
    if Utc::now() > session.expires_at {
        store.delete_session(ssid).await?;
        return Ok(None);
    }
    let payload: SessionPayload = postcard::from_bytes(&session.sess)?;
    store.get_user(payload.user_id).await
}

/// Idempotent: destroying an absent or already-destroyed session is fine.
pub async fn destroy(store: &dyn Store, ssid: &str) -> Result<(), Error> {
    if ssid.is_empty() {
        return Ok(());
    }
    store.delete_session(ssid).await
}

pub fn session_cookie_header(ssid: &str, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE,
        ssid,
        SESSION_TTL_DAYS * 24 * 60 * 60,
        if secure { "; Secure" } else { "" }
    )
}

pub fn clear_session_cookie_header(secure: bool) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        SESSION_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}
