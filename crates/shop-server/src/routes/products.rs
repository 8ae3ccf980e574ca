use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::Product;
use crate::routes::AppState;
use crate::services::catalog::{self, NewProduct, ProductChanges};

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(catalog::list_products(&state.db)?))
}

pub async fn create(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<NewProduct>, AppError>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let product = catalog::create_product(&state.db, body)?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(body), _): WithRejection<Json<ProductChanges>, AppError>,
) -> AppResult<Json<Product>> {
    Ok(Json(catalog::update_product(&state.db, id, body)?))
}

pub async fn delete(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<Json<Value>> {
    catalog::soft_delete_product(&state.db, id)?;
    Ok(Json(json!({ "message": "Product deleted" })))
}
