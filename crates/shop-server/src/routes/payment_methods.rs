use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;
use serde_json::{json, Value};

use crate::auth::identity::Identity;
use crate::error::{AppError, AppResult};
use crate::routes::AppState;
use crate::services::payment_methods::{self, CardDetails};

pub async fn add(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Json(card), _): WithRejection<Json<CardDetails>, AppError>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let method = payment_methods::add_payment_method(&state.db, identity.user_id, &card)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": method.id, "last4": method.last4() })),
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<Value>> {
    payment_methods::remove_payment_method(&state.db, identity.user_id)?;
    Ok(Json(json!({ "message": "Payment method removed" })))
}
