mod auth;
mod payment_methods;
mod products;
mod purchases;
mod sales;


use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::{require_admin, require_auth};
use crate::auth::token::TokenKeys;
use crate::config::Config;
use crate::db::DbPool;
use crate::services::payments::PaymentGateway;
use crate::services::purchase::CheckoutSettings;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: Arc<TokenKeys>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            currency: self.config.currency.clone(),
            payment_timeout: self.config.payment_timeout,
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Per-IP limit of `burst_size` requests, replenished at one per `per_second` seconds.
fn rate_limited(router: Router<AppState>, per_second: u64, burst_size: u32) -> Router<AppState> {
    match GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst_size)
        .finish()
    {
        Some(governor) => router.layer(GovernorLayer::new(Arc::new(governor))),
        None => {
            tracing::warn!(per_second, burst_size, "Invalid rate limit settings; route group left unlimited");
            router
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(health));

    let mut auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login));

    let admin = Router::new()
        .route("/api/admin/products", post(products::create))
        .route(
            "/api/admin/products/{id}",
            put(products::update).delete(products::delete),
        )
        .route("/api/admin/sales", get(sales::report))
        .route_layer(middleware::from_fn(require_admin));

    let mut protected = Router::new()
        .route(
            "/api/credit-card",
            post(payment_methods::add).delete(payment_methods::remove),
        )
        .route("/api/products", get(products::list))
        .route("/api/purchase", post(purchases::create))
        .route("/api/purchases", get(purchases::list))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    if state.config.rate_limit {
        // signup/login: 10 per minute per IP
        auth_routes = rate_limited(auth_routes, 6, 10);
        // api: 120 burst per IP
        protected = rate_limited(protected, 2, 120);
    }

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(protected)
        .with_state(state)
}
