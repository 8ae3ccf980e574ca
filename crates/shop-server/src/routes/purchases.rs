use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::auth::identity::Identity;
use crate::error::{AppError, AppResult};
use crate::models::PurchaseRecord;
use crate::routes::AppState;
use crate::services::purchase::{self, PurchaseReceipt};

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub product_ids: Vec<i64>,
    /// One-off gateway token; the stored card is used when absent.
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Json(body), _): WithRejection<Json<PurchaseRequest>, AppError>,
) -> AppResult<Json<PurchaseReceipt>> {
    let receipt = purchase::purchase(
        &state.db,
        state.payments.as_ref(),
        &state.checkout_settings(),
        &identity,
        &body.product_ids,
        body.source,
    )
    .await?;

    Ok(Json(receipt))
}

pub async fn list(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<Vec<PurchaseRecord>>> {
    Ok(Json(purchase::list_user_purchases(&state.db, identity.user_id)?))
}
