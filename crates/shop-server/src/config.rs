use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

pub const DEV_JWT_SECRET: &str = "change-me-to-a-random-32-char-string";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub db_busy_timeout_ms: u32,
    pub jwt_secret: String,
    pub use_stripe: bool,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_url: String,
    pub currency: String,
    pub payment_timeout: Duration,
    pub cors_origin: String,
    pub rate_limit: bool,
    pub allow_admin_signup: bool,
    pub admin: Option<AdminSeed>,
}

/// Credentials of the administrator created at startup when absent.
#[derive(Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let use_stripe: bool = parse_var("USE_STRIPE", false)?;
        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").ok().filter(|k| !k.is_empty());
        if use_stripe && stripe_secret_key.is_none() {
            bail!("STRIPE_SECRET_KEY must be set when USE_STRIPE=true");
        }

        let admin = match (env::var("ADMIN_EMAIL").ok(), env::var("ADMIN_PASSWORD").ok()) {
            (Some(email), Some(password)) => Some(AdminSeed {
                name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                email,
                password,
            }),
            (Some(_), None) | (None, Some(_)) => {
                bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together")
            }
            (None, None) => None,
        };

        Ok(Self {
            server_port: parse_var("PORT", 8000)?,
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/shop.db".to_string()),
            db_busy_timeout_ms: parse_var("DB_BUSY_TIMEOUT_MS", 5000)?,
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string()),
            use_stripe,
            stripe_secret_key,
            stripe_api_url: env::var("STRIPE_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            payment_timeout: Duration::from_secs(parse_var("PAYMENT_TIMEOUT_SECS", 10)?),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            rate_limit: parse_var("RATE_LIMIT", true)?,
            allow_admin_signup: parse_var("ALLOW_ADMIN_SIGNUP", false)?,
            admin,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Settings for in-process tests: mock payments, no rate limiting.
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            db_busy_timeout_ms: 1000,
            jwt_secret: "test-secret".to_string(),
            use_stripe: false,
            stripe_secret_key: None,
            stripe_api_url: "http://127.0.0.1:9".to_string(),
            currency: "usd".to_string(),
            payment_timeout: Duration::from_secs(2),
            cors_origin: "http://localhost:3000".to_string(),
            rate_limit: false,
            allow_admin_signup: false,
            admin: None,
        }
    }
}
