//! Storage seam for the stock ledger.
//!
//! Reads go straight through [`InventoryStore`]. Every stock-affecting write runs
//! inside a [`UnitOfWork`]: product, sale, return and ledger writes staged on the
//! same unit either all become visible at [`UnitOfWork::commit`] or none do.
//! Dropping a unit without committing discards it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{product, product_return, sale, stock_movement, MovementType};
use crate::errors::ServiceError;

pub mod memory;
pub mod sea;

pub use memory::{FaultPoint, MemoryStore};
pub use sea::SeaOrmStore;

/// Ledger query. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_product(product_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &stock_movement::Model) -> bool {
        self.product_id.map_or(true, |id| entry.product_id == id)
            && self
                .movement_type
                .map_or(true, |kind| entry.movement_type == kind)
            && self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at <= to)
    }
}

/// Last entry seen by a ledger page; the next page starts strictly after it
/// in `(created_at DESC, id DESC)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCursor {
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

impl LedgerCursor {
    pub fn of(entry: &stock_movement::Model) -> Self {
        Self {
            created_at: entry.created_at,
            id: entry.id,
        }
    }

    /// True when `entry` sorts after this cursor in newest-first order.
    pub fn precedes(&self, entry: &stock_movement::Model) -> bool {
        entry.created_at < self.created_at
            || (entry.created_at == self.created_at && entry.id < self.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub product_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl SaleFilter {
    pub fn matches(&self, sale: &sale::Model) -> bool {
        self.product_id.map_or(true, |id| sale.product_id == id)
            && self.seller_id.map_or(true, |id| sale.seller_id == id)
            && self.from.map_or(true, |from| sale.created_at >= from)
            && self.to.map_or(true, |to| sale.created_at <= to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReturnFilter {
    pub product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl ReturnFilter {
    pub fn matches(&self, record: &product_return::Model) -> bool {
        self.product_id.map_or(true, |id| record.product_id == id)
            && self.from.map_or(true, |from| record.created_at >= from)
            && self.to.map_or(true, |to| record.created_at <= to)
    }
}

/// A ledger entry before the store has assigned its sequence id.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProductRepository: Send {
    /// Reads the product inside the unit of work. Row-locking backends lock it
    /// until the unit ends.
    async fn find_product_for_update(
        &mut self,
        id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError>;

    async fn insert_product(&mut self, product: product::Model) -> Result<(), ServiceError>;

    /// Writes `product` only if the stored version still equals
    /// `expected_version`, otherwise fails with `ConcurrencyConflict`.
    /// Returns the product carrying its new version.
    async fn save_product(
        &mut self,
        product: product::Model,
        expected_version: i32,
    ) -> Result<product::Model, ServiceError>;
}

#[async_trait]
pub trait SaleRepository: Send {
    async fn insert_sale(&mut self, sale: sale::Model) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ReturnRepository: Send {
    async fn insert_return(&mut self, record: product_return::Model) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait LedgerRepository: Send {
    async fn append_movement(
        &mut self,
        entry: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError>;
}

#[async_trait]
pub trait UnitOfWork: ProductRepository + SaleRepository + ReturnRepository + LedgerRepository {
    async fn commit(self: Box<Self>) -> Result<(), ServiceError>;

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError>;
}

/// Count, quantity and revenue for one slice of the sales.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breakdown {
    pub count: u64,
    pub quantity: i64,
    pub revenue: Decimal,
}

impl Breakdown {
    fn add(&mut self, sale: &sale::Model) {
        self.count += 1;
        self.quantity += i64::from(sale.quantity);
        self.revenue += sale.total_price;
    }
}

/// Sales totals with payment-method and delivery-type breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesStats {
    pub sale_count: u64,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
    pub by_payment_method: BTreeMap<String, Breakdown>,
    pub by_delivery_type: BTreeMap<String, Breakdown>,
}

impl SalesStats {
    pub fn from_sales(sales: &[sale::Model]) -> Self {
        let mut stats = SalesStats::default();
        for sale in sales {
            stats.record(sale);
        }
        stats
    }

    /// Folds one sale into the totals.
    pub fn record(&mut self, sale: &sale::Model) {
        self.sale_count += 1;
        self.total_quantity += i64::from(sale.quantity);
        self.total_revenue += sale.total_price;
        self.by_payment_method
            .entry(sale.payment_method.to_string())
            .or_default()
            .add(sale);
        self.by_delivery_type
            .entry(sale.delivery_type.to_string())
            .or_default()
            .add(sale);
    }
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ServiceError>;

    /// Committed product state, archived products included.
    async fn find_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;

    /// Non-archived products ordered by name.
    async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError>;

    /// One page of the ledger, newest first, starting after `after`.
    async fn list_movements(
        &self,
        filter: &MovementFilter,
        after: Option<LedgerCursor>,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError>;

    /// Sales newest first.
    async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<sale::Model>, ServiceError>;

    /// Totals over every sale matching `filter`; `filter.limit` is ignored.
    async fn sales_stats(&self, filter: &SaleFilter) -> Result<SalesStats, ServiceError>;

    /// Returns newest first.
    async fn list_returns(
        &self,
        filter: &ReturnFilter,
    ) -> Result<Vec<product_return::Model>, ServiceError>;
}
