#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use salon_inventory::{
    config::AppConfig,
    db,
    entities::{product, DeliveryType, PaymentMethod, UserModel, UserRole},
    events::{Event, EventSender},
    services::{
        AdjustmentType, InventoryServices, InventorySettings, NewProduct, NewUser,
        RecordAdjustmentCommand, RecordReturnCommand, RecordSaleCommand,
    },
    store::{InventoryStore, MemoryStore},
    AppState,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig::new(
        database_url.to_string(),
        TEST_SECRET.to_string(),
        3600,
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    )
}

/// Inventory services over a [`MemoryStore`], with the event stream kept
/// for inspection.
pub struct Inventory {
    pub store: MemoryStore,
    pub services: InventoryServices,
    events: mpsc::Receiver<Event>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), InventorySettings::default())
    }

    pub fn with_retries(conflict_retries: u32) -> Self {
        Self::with_store(
            MemoryStore::new(),
            InventorySettings {
                conflict_retries,
                ..InventorySettings::default()
            },
        )
    }

    pub fn with_store(store: MemoryStore, settings: InventorySettings) -> Self {
        let (sender, events) = EventSender::channel(1024);
        let shared: Arc<dyn InventoryStore> = Arc::new(store.clone());
        Self {
            services: InventoryServices::new(shared, sender, settings),
            store,
            events,
        }
    }

    pub async fn product(&self, stock: i32, min_stock: i32) -> product::Model {
        self.product_expiring(stock, min_stock, None).await
    }

    pub async fn product_expiring(
        &self,
        stock: i32,
        min_stock: i32,
        expiry_date: Option<NaiveDate>,
    ) -> product::Model {
        self.services
            .catalog
            .create(new_product("Color Gloss", stock, min_stock, expiry_date), None)
            .await
            .expect("product created")
    }

    /// Committed state of the product, archived or not.
    pub async fn current(&self, id: Uuid) -> product::Model {
        self.store
            .find_product(id)
            .await
            .expect("store read")
            .expect("product exists")
    }

    /// Everything published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

pub fn new_product(
    name: &str,
    stock: i32,
    min_stock: i32,
    expiry_date: Option<NaiveDate>,
) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        category: "Hair Care".to_string(),
        brand: Some("Salon Pro".to_string()),
        buy_price: dec!(6.00),
        sell_price: dec!(12.50),
        stock,
        min_stock,
        expiry_date,
        barcode: None,
        description: None,
    }
}

pub fn yesterday() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

pub fn sale(product_id: Uuid, quantity: i32, seller_id: Uuid) -> RecordSaleCommand {
    RecordSaleCommand {
        product_id,
        quantity,
        payment_method: PaymentMethod::Cash,
        delivery_type: DeliveryType::Pickup,
        seller_id,
    }
}

pub fn customer_return(product_id: Uuid, quantity: i32, reason: &str, user_id: Uuid) -> RecordReturnCommand {
    RecordReturnCommand {
        product_id,
        quantity,
        reason: reason.to_string(),
        user_id,
    }
}

pub fn adjustment(
    product_id: Uuid,
    movement_type: AdjustmentType,
    quantity: i32,
    reason: &str,
    user_id: Uuid,
) -> RecordAdjustmentCommand {
    RecordAdjustmentCommand {
        product_id,
        movement_type,
        quantity,
        reason: reason.to_string(),
        user_id,
    }
}

pub fn price_times(quantity: i32) -> Decimal {
    dec!(12.50) * Decimal::from(quantity)
}

/// The HTTP application over an in-memory SQLite database, with one admin
/// and one seller account already signed in.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: UserModel,
    pub seller: UserModel,
    pub admin_token: String,
    pub seller_token: String,
    _events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config("sqlite::memory:");
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations");

        let (sender, events) = EventSender::channel(256);
        let state = AppState::new(Arc::new(pool), cfg, sender);

        let admin = Self::account(&state, "admin", UserRole::Admin).await;
        let seller = Self::account(&state, "seller", UserRole::Seller).await;
        let admin_token = state.auth.issue_token(&admin).expect("token").access_token;
        let seller_token = state.auth.issue_token(&seller).expect("token").access_token;

        Self {
            router: salon_inventory::build_router(state.clone()),
            state,
            admin,
            seller,
            admin_token,
            seller_token,
            _events: events,
        }
    }

    async fn account(state: &AppState, username: &str, role: UserRole) -> UserModel {
        state
            .users
            .create_user(NewUser {
                username: username.to_string(),
                password: TEST_PASSWORD.to_string(),
                name: username.to_string(),
                role,
            })
            .await
            .expect("user created")
    }

    /// Sends one request and returns the status with the decoded JSON body
    /// (`Value::Null` when the body is empty).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }
}
