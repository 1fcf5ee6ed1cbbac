//! Write path shared by every operation that touches `products.stock`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use metrics::counter;
use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use super::locks::ProductLocks;
use crate::entities::{product, stock_movement, MovementType};
use crate::errors::ServiceError;
use crate::store::{InventoryStore, NewMovement, UnitOfWork};

pub const REASON_SALE: &str = "sale";
pub const REASON_MANUAL_EDIT: &str = "manual edit";
pub const REASON_INITIAL_STOCK: &str = "initial stock";

pub fn return_reason(reason: &str) -> String {
    format!("return: {}", reason)
}

const RETRY_BASE_DELAY_MS: u64 = 5;

/// Pause after failed `attempt` (1-based): exponential base plus up to 100% jitter.
fn retry_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY_MS << attempt.saturating_sub(1).min(6);
    let jitter = rand::thread_rng().gen_range(0..=base);
    Duration::from_millis(base + jitter)
}

/// Runs stock transactions one product at a time.
///
/// Each call holds the product's lock for its whole duration and executes the
/// operation inside a fresh unit of work. A `ConcurrencyConflict` raised by
/// the store (another process wrote the row) restarts the operation on a new
/// unit, up to `max_attempts` attempts in total.
#[derive(Clone)]
pub struct StockCoordinator {
    store: Arc<dyn InventoryStore>,
    locks: ProductLocks,
    max_attempts: u32,
}

impl StockCoordinator {
    pub fn new(store: Arc<dyn InventoryStore>, max_attempts: u32) -> Self {
        Self {
            store,
            locks: ProductLocks::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    pub async fn run<T, F>(&self, product_id: Uuid, op: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: for<'u> Fn(&'u mut dyn UnitOfWork) -> BoxFuture<'u, Result<T, ServiceError>>
            + Send
            + Sync,
    {
        let _guard = self.locks.acquire(product_id).await;

        let mut attempt = 1;
        loop {
            match self.attempt(&op).await {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    counter!("salon_inventory.stock.conflicts", 1);
                    warn!(
                        product_id = %product_id,
                        attempt,
                        "Stock write conflicted, retrying"
                    );
                    tokio::time::sleep(retry_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        counter!("salon_inventory.stock.conflicts_exhausted", 1);
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    async fn attempt<T, F>(&self, op: &F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: for<'u> Fn(&'u mut dyn UnitOfWork) -> BoxFuture<'u, Result<T, ServiceError>>
            + Send
            + Sync,
    {
        let mut uow = self.store.begin().await?;
        let outcome = op(uow.as_mut()).await;
        match outcome {
            Ok(value) => {
                uow.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!("Rollback after failed stock write also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Re-reads a product inside the unit of work. Archived products count as missing.
pub(crate) async fn load_active_product(
    uow: &mut dyn UnitOfWork,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    match uow.find_product_for_update(product_id).await? {
        Some(found) if !found.is_archived() => Ok(found),
        _ => Err(ServiceError::product_not_found(product_id)),
    }
}

/// Moves `product.stock` by `delta` and persists it under the version check.
pub(crate) async fn adjust_stock(
    uow: &mut dyn UnitOfWork,
    mut product: product::Model,
    delta: i32,
    now: DateTime<Utc>,
) -> Result<product::Model, ServiceError> {
    let new_stock = product
        .stock
        .checked_add(delta)
        .ok_or_else(|| ServiceError::ValidationError("stock quantity out of range".into()))?;
    if new_stock < 0 {
        return Err(ServiceError::InsufficientStock {
            product_id: product.id,
            requested: -delta,
            available: product.stock,
        });
    }

    let expected_version = product.version;
    product.stock = new_stock;
    product.updated_at = now;
    uow.save_product(product, expected_version).await
}

pub(crate) struct MovementDraft {
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reason: String,
    pub user_id: Option<Uuid>,
}

/// Appends the ledger entry describing a stock change from `previous_stock`
/// to `after.stock`.
pub(crate) async fn record_movement(
    uow: &mut dyn UnitOfWork,
    previous_stock: i32,
    after: &product::Model,
    draft: MovementDraft,
    now: DateTime<Utc>,
) -> Result<stock_movement::Model, ServiceError> {
    debug!(
        product_id = %after.id,
        movement_type = %draft.movement_type,
        quantity = draft.quantity,
        "appending stock movement"
    );
    uow.append_movement(NewMovement {
        product_id: after.id,
        user_id: draft.user_id,
        movement_type: draft.movement_type,
        quantity: draft.quantity,
        previous_stock,
        new_stock: after.stock,
        reason: draft.reason,
        created_at: now,
    })
    .await
}

/// Stock change plus its ledger entry, in that order.
pub(crate) async fn apply_movement(
    uow: &mut dyn UnitOfWork,
    product: product::Model,
    draft: MovementDraft,
    now: DateTime<Utc>,
) -> Result<(product::Model, stock_movement::Model), ServiceError> {
    let previous_stock = product.stock;
    let delta = draft.movement_type.signed(draft.quantity);
    let updated = adjust_stock(uow, product, delta, now).await?;
    let movement = record_movement(uow, previous_stock, &updated, draft, now).await?;
    Ok((updated, movement))
}
