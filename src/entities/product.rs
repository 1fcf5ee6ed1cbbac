use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Digits after the point in every money column.
pub const MONEY_SCALE: u32 = 2;
/// Largest amount a `DECIMAL(14, 2)` money column holds.
pub const MAX_MONEY: Decimal = rust_decimal_macros::dec!(999999999999.99);

/// True when `amount` is storable in a money column without rounding or overflow.
pub fn fits_money_column(amount: Decimal) -> bool {
    amount.abs() <= MAX_MONEY && amount.normalize().scale() <= MONEY_SCALE
}

/// Product entity. `stock` is the authoritative on-hand quantity.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    pub category: String,

    pub brand: Option<String>,

    /// Purchase cost per unit
    pub buy_price: Decimal,

    /// Retail price per unit, snapshotted onto every sale
    pub sell_price: Decimal,

    /// On-hand quantity, never negative
    pub stock: i32,

    /// Low-stock threshold
    pub min_stock: i32,

    pub expiry_date: Option<NaiveDate>,

    pub barcode: Option<String>,

    pub description: Option<String>,

    /// Optimistic concurrency token, bumped on every write
    pub version: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set when the product is archived; archived products are invisible to the catalog
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sale::Entity")]
    Sales,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
    #[sea_orm(has_many = "super::product_return::Entity")]
    Returns,
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sales.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl Related<super::product_return::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Returns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_archived(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }

    /// A product is expired from its expiration date onwards.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expiry_date.map_or(false, |date| date <= today)
    }

    pub fn expires_within(&self, today: NaiveDate, days: i64) -> bool {
        self.expiry_date
            .map_or(false, |date| date <= today + chrono::Duration::days(days))
    }
}
