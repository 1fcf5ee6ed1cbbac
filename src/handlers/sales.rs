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
    entities::{sale, DeliveryType, PaymentMethod},
    errors::ServiceError,
    services::{RecordSaleCommand, SalesStats},
    store::SaleFilter,
    ApiResponse, ApiResult, AppState,
};

const MAX_SALES_PAGE: u64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct SalesQuery {
    pub product_id: Option<Uuid>,
    /// Ignored for sellers, who only see their own sales.
    pub seller_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl SalesQuery {
    fn into_filter(self) -> SaleFilter {
        SaleFilter {
            product_id: self.product_id,
            seller_id: self.seller_id,
            from: self.from,
            to: self.to,
            limit: Some(self.limit.unwrap_or(100).clamp(1, MAX_SALES_PAGE)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub payment_method: PaymentMethod,
    pub delivery_type: DeliveryType,
}

pub async fn list_sales(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SalesQuery>,
) -> ApiResult<Vec<sale::Model>> {
    let sales = state
        .services
        .sales
        .list_sales(query.into_filter(), caller)
        .await?;
    Ok(Json(ApiResponse::success(sales)))
}

/// Records a sale made by the caller.
pub async fn record_sale(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<RecordSaleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<sale::Model>>), ServiceError> {
    let command = RecordSaleCommand {
        product_id: payload.product_id,
        quantity: payload.quantity,
        payment_method: payload.payment_method,
        delivery_type: payload.delivery_type,
        seller_id: caller.user_id,
    };
    let sale = state.services.sales.record_sale(command).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(sale))))
}

pub async fn sales_stats(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SalesQuery>,
) -> ApiResult<SalesStats> {
    let stats = state
        .services
        .reports
        .sales_stats(query.into_filter(), caller)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}
