use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::WithRejection;

use crate::error::{AppError, AppResult};
use crate::models::Sale;
use crate::routes::AppState;
use crate::services::sales::{self, SalesFilter};

/// `GET /api/admin/sales?user=&from=YYYY-MM-DD&to=YYYY-MM-DD`
pub async fn report(
    State(state): State<AppState>,
    WithRejection(Query(filter), _): WithRejection<Query<SalesFilter>, AppError>,
) -> AppResult<Json<Vec<Sale>>> {
    Ok(Json(sales::sales_report(&state.db, &filter)?))
}
