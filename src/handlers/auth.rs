use axum::{extract::State, response::Json};

use crate::{
    auth::Caller,
    services::{LoginRequest, LoginResponse},
    ApiResponse, ApiResult, AppState,
};

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let response = state.users.login(payload).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Echoes the identity carried by the bearer token.
pub async fn verify(caller: Caller) -> ApiResult<Caller> {
    Ok(Json(ApiResponse::success(caller)))
}
