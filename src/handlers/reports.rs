use axum::{extract::State, response::Json};

use crate::{services::StockAlerts, ApiResponse, ApiResult, AppState};

/// Low-stock, expiring and expired products.
pub async fn stock_alerts(State(state): State<AppState>) -> ApiResult<StockAlerts> {
    let alerts = state.services.reports.stock_alerts().await?;
    Ok(Json(ApiResponse::success(alerts)))
}
