use std::env;
use std::net::SocketAddr;

use anyhow::Context;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    /// Set the `Secure` flag on issued cookies (production deployments).
    pub cookie_secure: bool,
    pub google: Option<GoogleConfig>,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_REDIRECT_URL: &str = "http://localhost:3000/api/auth/google/callback";

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a valid socket address")?;

        let google = match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url: env::var("GOOGLE_REDIRECT_URL")
                    .unwrap_or_else(|_| DEFAULT_REDIRECT_URL.to_string()),
            }),
            _ => {
                log::warn!("google credentials not set; federated login disabled");
                None
            }
        };

        Ok(Config {
            bind_addr,
            database_url,
            cookie_secure: env_flag("COOKIE_SECURE"),
            google,
        })
    }
}
