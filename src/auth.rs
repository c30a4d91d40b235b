use std::sync::Arc;

use axum::headers::Cookie;
use axum::{Extension, Json, TypedHeader};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::gate;
use crate::google::{self, GoogleAssertion};
use crate::models::{NewUser, ProfileFields, PublicUser, StudentProfile, UserRecord, UserRole};
use crate::store::{SharedStore, Store};
use crate::{password, proceeds, session, validate, Error, Payload, Reply};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub college: String,
    pub year_of_study: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserReply {
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutReply {
    pub message: String,
}

/// Credential material presented by a login attempt, dispatched by its
/// explicit variant rather than a registered strategy.
#[derive(Debug, Clone)]
pub enum Credentials {
    Local { email: String, password: String },
    Federated { assertion: GoogleAssertion },
}

fn invalid_credentials() -> Error {
    // One message for every local failure mode, so the response never
    // reveals whether the email exists or how the account authenticates.
    Error::AuthenticationFailure {
        message: "Invalid email or password".to_string(),
    }
}

/// Single entry point for credential verification.
pub async fn authenticate(
    store: &dyn Store,
    credentials: Credentials,
) -> Result<UserRecord, Error> {
    match credentials {
        Credentials::Local { email, password } => {
            let user = match store.get_user_by_email(&email).await? {
                Some(user) => user,
                None => return Err(invalid_credentials()),
            };
            let hash = match &user.password_hash {
                Some(hash) => hash.clone(),
                // federated-only account; no local login path
                None => return Err(invalid_credentials()),
            };
            if !password::verify_password(&password, &hash) {
                return Err(invalid_credentials());
            }
            Ok(user)
        }
        Credentials::Federated { assertion } => {
            google::complete_federated_login(store, &assertion).await
        }
    }
}

/// Creates the identity and its student profile in one store transaction.
/// Validation must already have passed; the store's uniqueness invariant is
/// the authority on duplicate emails (including concurrent races).
pub async fn register_student(
    store: &dyn Store,
    register: RegisterRequest,
) -> Result<(UserRecord, StudentProfile), Error> {
    if store.get_user_by_email(&register.email).await?.is_some() {
        return Err(Error::UserAlreadyExists {
            message: "User already exists".to_string(),
        });
    }

    let password_hash = password::hash_password(&register.password)?;
    store
        .create_student_with_profile(
            NewUser {
                email: register.email,
                password_hash: Some(password_hash),
                name: register.name,
                profile_image_url: None,
                role: UserRole::Student,
                google_id: None,
            },
            ProfileFields {
                phone: register.phone,
                college: register.college,
                year_of_study: register.year_of_study,
                location: register.location,
            },
        )
        .await
}

pub async fn login(
    Json(login): Json<LoginRequest>,
    Extension(store): Extension<SharedStore>,
    Extension(config): Extension<Arc<Config>>,
) -> Payload<UserReply> {
    validate::validate_login(&login)?;

    let user = authenticate(
        &*store,
        Credentials::Local {
            email: login.email,
            password: login.password,
        },
    )
    .await?;

    let session = session::establish(&*store, user.id).await?;
    log::info!("user {} logged in", user.id);

    Ok(Reply::ok(UserReply {
        user: PublicUser::from(&user),
    })
    .with_cookie(session::session_cookie_header(
        &session.ssid,
        config.cookie_secure,
    )))
}

pub async fn register(
    Json(register): Json<RegisterRequest>,
    Extension(store): Extension<SharedStore>,
    Extension(config): Extension<Arc<Config>>,
) -> Payload<UserReply> {
    validate::validate_register(&register)?;

    let (user, _profile) = register_student(&*store, register).await?;
    let session = session::establish(&*store, user.id).await?;
    log::info!("registered student {} ({})", user.id, user.email);

    Ok(Reply::created(UserReply {
        user: PublicUser::from(&user),
    })
    .with_cookie(session::session_cookie_header(
        &session.ssid,
        config.cookie_secure,
    )))
}

pub async fn current_user(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(store): Extension<SharedStore>,
) -> Payload<UserReply> {
    let user = gate::require_authenticated(&*store, gate::session_cookie(&cookies)).await?;
    proceeds(UserReply {
        user: PublicUser::from(&user),
    })
}

pub async fn logout(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(store): Extension<SharedStore>,
    Extension(config): Extension<Arc<Config>>,
) -> Payload<LogoutReply> {
    if let Some(ssid) = gate::session_cookie(&cookies) {
        session::destroy(&*store, &ssid).await?;
    }
    Ok(Reply::ok(LogoutReply {
        message: "Logged out successfully".to_string(),
    })
    .with_cookie(session::clear_session_cookie_header(config.cookie_secure)))
}
