mod config;
mod db;
mod error;
mod models;
mod services;
mod auth;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use auth::token::TokenKeys;
use axum::http::{header, HeaderValue, Method};
use config::Config;
use routes::{create_router, AppState};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shop_server=debug,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (from repo root)
    dotenvy::from_filename("../../.env").ok();
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development secret");
    }
    let port = config.server_port;

    let pool = db::create_pool(&config.sqlite_path, config.db_busy_timeout_ms)?;
    tracing::info!("Database initialized at {}", config.sqlite_path);

    if let Some(seed) = &config.admin {
        services::users::ensure_admin(&pool, &seed.name, &seed.email, &seed.password)
            .context("Failed to seed admin account")?;
    }

    let state = AppState {
        db: pool,
        tokens: Arc::new(TokenKeys::new(&config.jwt_secret)),
        payments: services::payments::from_config(&config)?,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .context("CORS_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("shop-server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    // Rate limiting keys on the peer address.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server failed")?;

    Ok(())
}
