use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::auth::identity::Identity;
use crate::auth::token::TokenKeys;
use crate::error::{AppError, AppResult};
use crate::models::Role;
use crate::routes::AppState;

/// Resolve the caller from `Authorization: Bearer <token>`.
pub fn authenticate(headers: &HeaderMap, keys: &TokenKeys) -> AppResult<Identity> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Unauthenticated)?;

    let token = bearer.token().trim();
    if token.is_empty() {
        return Err(AppError::Unauthenticated);
    }

    Ok(keys.verify(token)?)
}

pub fn authorize(identity: &Identity, required: Role) -> AppResult<()> {
    match required {
        Role::User => Ok(()),
        Role::Admin if identity.is_admin() => Ok(()),
        Role::Admin => {
            tracing::warn!(user_id = identity.user_id, "Admin route refused for non-admin");
            Err(AppError::Forbidden)
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = authenticate(request.headers(), &state.tokens)?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Layer after [`require_auth`]; the identity it attached is re-read here.
pub async fn require_admin(
    identity: Identity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&identity, Role::Admin)?;
    Ok(next.run(request).await)
}
