use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::Caller,
    services::{NewProduct, ProductDetail, ProductUpdate, ProductView},
    ApiResponse, ApiResult, AppState,
};

/// Active products ordered by name, with stock and expiry flags.
pub async fn list_products(
    State(state): State<AppState>,
    _caller: Caller,
) -> ApiResult<Vec<ProductView>> {
    let products = state.services.catalog.list().await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn get_product(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductDetail> {
    let detail = state.services.catalog.get_detail(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

pub async fn create_product(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<NewProduct>,
) -> Result<(StatusCode, Json<ApiResponse<ProductView>>), crate::errors::ServiceError> {
    let catalog = &state.services.catalog;
    let created = catalog.create(payload, Some(caller.user_id)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(catalog.view(created))),
    ))
}

pub async fn update_product(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductUpdate>,
) -> ApiResult<ProductView> {
    let catalog = &state.services.catalog;
    let updated = catalog.update(id, payload, Some(caller.user_id)).await?;
    Ok(Json(ApiResponse::success(catalog.view(updated))))
}

/// Archives the product; its history stays queryable.
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.services.catalog.delete(id).await?;
    Ok(Json(ApiResponse::message("Product deleted")))
}
