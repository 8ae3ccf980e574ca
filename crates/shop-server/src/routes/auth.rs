use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{Role, UserPublic};
use crate::routes::AppState;
use crate::services::users::{self, NewUser};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

pub async fn signup(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<SignupRequest>, AppError>,
) -> AppResult<(StatusCode, Json<UserPublic>)> {
    if body.role == Role::Admin && !state.config.allow_admin_signup {
        tracing::warn!("Refused self-service admin signup");
        return Err(AppError::Forbidden);
    }

    let user = users::create_user(
        &state.db,
        NewUser {
            name: &body.name,
            email: &body.email,
            password: &body.password,
            role: body.role,
        },
    )?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<LoginResponse>> {
    let user = users::authenticate(&state.db, &body.email, &body.password)?;
    let issued = state.tokens.issue(user.id, user.role)?;

    tracing::info!(user_id = user.id, role = %user.role, "Login succeeded");
    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
    }))
}
