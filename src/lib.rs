//! Salon Inventory Library
//!
//! Product catalog, stock ledger and the sale, return and adjustment
//! recorders of a salon point of sale, plus the HTTP API wrapping them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;
pub mod store;
pub mod tracing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::events::EventSender;
use crate::services::{InventoryServices, InventorySettings, UserService};
use crate::store::{InventoryStore, SeaOrmStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: InventoryServices,
    pub users: Arc<UserService>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires every service over one database connection.
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig, events: EventSender) -> Self {
        let store: Arc<dyn InventoryStore> = Arc::new(SeaOrmStore::new(db.clone()));
        Self::with_store(db, store, config, events)
    }

    /// Like [`AppState::new`] but over an explicit inventory store.
    pub fn with_store(
        db: Arc<DatabaseConnection>,
        store: Arc<dyn InventoryStore>,
        config: config::AppConfig,
        events: EventSender,
    ) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let services = InventoryServices::new(store, events, InventorySettings::from(&config));
        let users = Arc::new(UserService::new(db.clone(), auth.clone()));
        Self {
            db,
            config,
            services,
            users,
            auth,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    /// Successful response without a payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/auth/login", post(handlers::auth::login));

    // Any authenticated staff member
    let staff = Router::new()
        .route("/auth/verify", get(handlers::auth::verify))
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route(
            "/sales",
            get(handlers::sales::list_sales).post(handlers::sales::record_sale),
        )
        .route("/sales/stats", get(handlers::sales::sales_stats))
        .with_auth();

    let admin = Router::new()
        .route("/products", post(handlers::products::create_product))
        .route(
            "/products/:id",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .route(
            "/stock/movements",
            get(handlers::stock::list_movements).post(handlers::stock::record_adjustment),
        )
        .route(
            "/stock/returns",
            get(handlers::stock::list_returns).post(handlers::stock::record_return),
        )
        .route("/reports/alerts", get(handlers::reports::stock_alerts))
        .admin_only();

    Router::new().merge(public).merge(staff).merge(admin)
}

/// The full application: API routes plus request id, tracing, timeout and
/// auth wiring.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(Extension(state.auth.clone()))
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(crate::tracing::http_trace_layer())
        .layer(axum::middleware::from_fn(crate::tracing::request_id_middleware))
        .with_state(state)
}
