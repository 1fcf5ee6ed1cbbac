use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::Caller,
    entities::{product_return, stock_movement, MovementType},
    errors::ServiceError,
    services::{AdjustmentType, RecordAdjustmentCommand, RecordReturnCommand},
    store::{MovementFilter, ReturnFilter},
    ApiResponse, ApiResult, AppState,
};

const DEFAULT_PAGE: usize = 100;
const MAX_PAGE: usize = 1000;

fn page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementsQuery {
    pub product_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnsQuery {
    pub product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    pub product_id: Uuid,
    pub movement_type: AdjustmentType,
    pub quantity: i32,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub reason: String,
}

/// Ledger entries, newest first.
pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementsQuery>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let filter = MovementFilter {
        product_id: query.product_id,
        movement_type: query.movement_type,
        from: query.from,
        to: query.to,
    };
    let entries = state
        .services
        .ledger
        .recent(filter, page_limit(query.limit))
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

pub async fn record_adjustment(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<stock_movement::Model>>), ServiceError> {
    let command = RecordAdjustmentCommand {
        product_id: payload.product_id,
        movement_type: payload.movement_type,
        quantity: payload.quantity,
        reason: payload.reason,
        user_id: caller.user_id,
    };
    let entry = state.services.adjustments.record_adjustment(command).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(entry))))
}

pub async fn list_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnsQuery>,
) -> ApiResult<Vec<product_return::Model>> {
    let filter = ReturnFilter {
        product_id: query.product_id,
        from: query.from,
        to: query.to,
        limit: Some(page_limit(query.limit) as u64),
    };
    let returns = state.services.returns.list_returns(filter).await?;
    Ok(Json(ApiResponse::success(returns)))
}

pub async fn record_return(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<ReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<product_return::Model>>), ServiceError> {
    let command = RecordReturnCommand {
        product_id: payload.product_id,
        quantity: payload.quantity,
        reason: payload.reason,
        user_id: caller.user_id,
    };
    let record = state.services.returns.record_return(command).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_defaults_and_caps() {
        assert_eq!(page_limit(None), DEFAULT_PAGE);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(50_000)), MAX_PAGE);
    }
}
