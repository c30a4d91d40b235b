pub mod auth;
pub mod config;
pub mod err;
pub mod gate;
pub mod google;
pub mod models;
pub mod password;
pub mod session;
pub mod store;
pub mod validate;

use std::sync::Arc;

use axum::handler::Handler;
use axum::{routing::get, routing::post, Extension, Router};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;

use crate::config::Config;
use crate::store::{PgStore, SharedStore};

pub use crate::err::{Error, Reply};

pub type Payload<T> = axum::response::Result<Reply<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::ok(value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Arc::new(Config::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store: SharedStore = Arc::new(PgStore::new(pool));

    let app = Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/register", post(auth::register))
        .route("/api/user", get(auth::current_user))
        .route("/api/logout", post(auth::logout))
        .route("/api/auth/google", get(google::google_login))
        .route("/api/auth/google/callback", get(google::google_callback))
        .route("/api/protected", get(gate::protected_route))
        .route("/api/admin/dashboard", get(gate::admin_dashboard))
        .fallback(err::handler404.into_service())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(store))
                .layer(Extension(config.clone()))
                .layer(Extension(reqwest::Client::new())),
        );

    let addr = config.bind_addr;
    log::info!("Starting StudyGate HTTP Server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
