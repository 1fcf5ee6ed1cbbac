use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::stock::{
    apply_movement, load_active_product, record_movement, MovementDraft, StockCoordinator,
    REASON_INITIAL_STOCK, REASON_MANUAL_EDIT,
};
use crate::entities::{
    fits_money_column, product, product_return, sale, stock_movement, MovementType, MAX_MONEY,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::store::{MovementFilter, ReturnFilter, SaleFilter};

const RECENT_HISTORY: u64 = 10;

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn money_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("negative_price");
        err.message = Some("price must not be negative".into());
        return Err(err);
    }
    if !fits_money_column(*value) {
        let mut err = ValidationError::new("price_out_of_range");
        err.message = Some(
            format!("price must be at most {} with at most 2 decimal places", MAX_MONEY).into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NewProduct {
    #[validate(custom = "not_blank", length(max = 255))]
    pub name: String,
    #[validate(custom = "not_blank", length(max = 255))]
    pub category: String,
    pub brand: Option<String>,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub buy_price: Decimal,
    #[validate(custom = "money_amount")]
    pub sell_price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_stock: i32,
    pub expiry_date: Option<NaiveDate>,
    pub barcode: Option<String>,
    pub description: Option<String>,
}

/// Partial product edit. Omitted fields are left unchanged; nullable fields
/// are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProductUpdate {
    #[validate(custom = "not_blank", length(max = 255))]
    pub name: Option<String>,
    #[validate(custom = "not_blank", length(max = 255))]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub brand: Option<Option<String>>,
    #[validate(custom = "money_amount")]
    pub buy_price: Option<Decimal>,
    #[validate(custom = "money_amount")]
    pub sell_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub expiry_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub barcode: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

impl ProductUpdate {
    /// Applies every field except `stock`, which only moves through the ledger.
    fn apply_fields(&self, product: &mut product::Model) {
        if let Some(name) = &self.name {
            product.name = name.trim().to_string();
        }
        if let Some(category) = &self.category {
            product.category = category.trim().to_string();
        }
        if let Some(brand) = &self.brand {
            product.brand = brand.clone();
        }
        if let Some(price) = self.buy_price {
            product.buy_price = price;
        }
        if let Some(price) = self.sell_price {
            product.sell_price = price;
        }
        if let Some(min_stock) = self.min_stock {
            product.min_stock = min_stock;
        }
        if let Some(expiry_date) = self.expiry_date {
            product.expiry_date = expiry_date;
        }
        if let Some(barcode) = &self.barcode {
            product.barcode = barcode.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
    }
}

/// A product as shown to staff, with its stock and expiry flags.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: product::Model,
    pub is_low_stock: bool,
    pub is_expired: bool,
    pub is_expiring: bool,
}

impl ProductView {
    pub fn new(product: product::Model, today: NaiveDate, warning_days: i64) -> Self {
        let is_expired = product.is_expired_on(today);
        Self {
            is_low_stock: product.is_low_stock(),
            is_expiring: !is_expired && product.expires_within(today, warning_days),
            is_expired,
            product,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    pub product: ProductView,
    pub recent_sales: Vec<sale::Model>,
    pub recent_movements: Vec<stock_movement::Model>,
    pub recent_returns: Vec<product_return::Model>,
}

/// Product catalog. Every write that changes stock goes through the ledger.
#[derive(Clone)]
pub struct ProductCatalogService {
    coordinator: StockCoordinator,
    events: EventSender,
    expiry_warning_days: i64,
}

impl ProductCatalogService {
    pub fn new(coordinator: StockCoordinator, events: EventSender, expiry_warning_days: i64) -> Self {
        Self {
            coordinator,
            events,
            expiry_warning_days,
        }
    }

    pub fn view(&self, product: product::Model) -> ProductView {
        ProductView::new(product, Utc::now().date_naive(), self.expiry_warning_days)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<ProductView, ServiceError> {
        match self.coordinator.store().find_product(id).await? {
            Some(found) if !found.is_archived() => Ok(self.view(found)),
            _ => Err(ServiceError::product_not_found(id)),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_detail(&self, id: Uuid) -> Result<ProductDetail, ServiceError> {
        let product = self.get(id).await?;
        let store = self.coordinator.store();

        let recent_sales = store
            .list_sales(&SaleFilter {
                product_id: Some(id),
                limit: Some(RECENT_HISTORY),
                ..Default::default()
            })
            .await?;
        let recent_movements = store
            .list_movements(&MovementFilter::for_product(id), None, RECENT_HISTORY)
            .await?;
        let recent_returns = store
            .list_returns(&ReturnFilter {
                product_id: Some(id),
                limit: Some(RECENT_HISTORY),
                ..Default::default()
            })
            .await?;

        Ok(ProductDetail {
            product,
            recent_sales,
            recent_movements,
            recent_returns,
        })
    }

    /// Active products ordered by name.
    pub async fn list(&self) -> Result<Vec<ProductView>, ServiceError> {
        let today = Utc::now().date_naive();
        Ok(self
            .coordinator
            .store()
            .list_products()
            .await?
            .into_iter()
            .map(|p| ProductView::new(p, today, self.expiry_warning_days))
            .collect())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        input: NewProduct,
        actor: Option<Uuid>,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let product = product::Model {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            category: input.category.trim().to_string(),
            brand: input.brand,
            buy_price: input.buy_price,
            sell_price: input.sell_price,
            stock: input.stock,
            min_stock: input.min_stock,
            expiry_date: input.expiry_date,
            barcode: input.barcode,
            description: input.description,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let created = self
            .coordinator
            .run(product.id, move |uow| {
                let product = product.clone();
                Box::pin(async move {
                    uow.insert_product(product.clone()).await?;
                    if product.stock > 0 {
                        let draft = MovementDraft {
                            movement_type: MovementType::In,
                            quantity: product.stock,
                            reason: REASON_INITIAL_STOCK.to_string(),
                            user_id: actor,
                        };
                        record_movement(uow, 0, &product, draft, now).await?;
                    }
                    Ok(product)
                })
            })
            .await?;

        info!(product_id = %created.id, stock = created.stock, "Product created");
        self.events.publish(Event::ProductCreated(created.id));
        Ok(created)
    }

    /// Edits a product. A changed stock value is written together with a
    /// "manual edit" ledger entry for the difference.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: ProductUpdate,
        actor: Option<Uuid>,
    ) -> Result<product::Model, ServiceError> {
        changes.validate()?;

        let (updated, movement) = self
            .coordinator
            .run(id, move |uow| {
                let changes = changes.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let mut product = load_active_product(uow, id).await?;
                    let previous_stock = product.stock;
                    changes.apply_fields(&mut product);
                    product.updated_at = now;

                    match changes.stock {
                        Some(target) if target != previous_stock => {
                            let diff = target - previous_stock;
                            let draft = MovementDraft {
                                movement_type: if diff > 0 {
                                    MovementType::In
                                } else {
                                    MovementType::Out
                                },
                                quantity: diff.abs(),
                                reason: REASON_MANUAL_EDIT.to_string(),
                                user_id: actor,
                            };
                            let (saved, entry) = apply_movement(uow, product, draft, now).await?;
                            Ok((saved, Some(entry)))
                        }
                        _ => {
                            let expected_version = product.version;
                            let saved = uow.save_product(product, expected_version).await?;
                            Ok((saved, None))
                        }
                    }
                })
            })
            .await?;

        info!(product_id = %id, stock_changed = movement.is_some(), "Product updated");
        self.events.publish(Event::ProductUpdated(id));
        if let Some(entry) = movement {
            self.events.publish(Event::StockAdjusted {
                product_id: id,
                movement_type: entry.movement_type,
                quantity: entry.quantity,
                new_stock: entry.new_stock,
            });
            if entry.movement_type == MovementType::Out && updated.is_low_stock() {
                self.events.publish(Event::LowStock {
                    product_id: id,
                    stock: updated.stock,
                    min_stock: updated.min_stock,
                });
            }
        }
        Ok(updated)
    }

    /// Archives a product. Its sales, returns and ledger entries are kept.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.coordinator
            .run(id, move |uow| {
                Box::pin(async move {
                    let mut product = load_active_product(uow, id).await?;
                    let now = Utc::now();
                    product.deleted_at = Some(now);
                    product.updated_at = now;
                    let expected_version = product.version;
                    uow.save_product(product, expected_version).await?;
                    Ok(())
                })
            })
            .await?;

        info!(product_id = %id, "Product archived");
        self.events.publish(Event::ProductArchived(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_is_rejected() {
        let input: NewProduct = serde_json::from_value(serde_json::json!({
            "name": "   ",
            "category": "Nails",
            "sell_price": "4.50"
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn negative_price_is_rejected() {
        let input: NewProduct = serde_json::from_value(serde_json::json!({
            "name": "Polish",
            "category": "Nails",
            "sell_price": "-1"
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn prices_must_fit_the_money_column() {
        let priced = |price: &str| -> NewProduct {
            serde_json::from_value(serde_json::json!({
                "name": "Gold Leaf Serum",
                "category": "Skin Care",
                "sell_price": price
            }))
            .unwrap()
        };
        assert!(priced("999999999999.99").validate().is_ok());
        assert!(priced("12.50").validate().is_ok());
        assert!(priced("1000000000000").validate().is_err());
        assert!(priced("70000000000000000000000000000").validate().is_err());
        assert!(priced("4.999").validate().is_err());

        let update: ProductUpdate =
            serde_json::from_value(serde_json::json!({ "buy_price": "10000000000000" })).unwrap();
        assert!(update.validate().is_err());
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let clear: ProductUpdate =
            serde_json::from_value(serde_json::json!({ "expiry_date": null })).unwrap();
        assert_eq!(clear.expiry_date, Some(None));

        let keep: ProductUpdate = serde_json::from_value(serde_json::json!({ "stock": 3 })).unwrap();
        assert_eq!(keep.expiry_date, None);
        assert_eq!(keep.stock, Some(3));
    }

    #[test]
    fn expired_products_are_not_also_expiring() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let now = Utc::now();
        let product = product::Model {
            id: Uuid::new_v4(),
            name: "Toner".into(),
            category: "Skin".into(),
            brand: None,
            buy_price: Decimal::ONE,
            sell_price: Decimal::TEN,
            stock: 9,
            min_stock: 1,
            expiry_date: Some(today),
            barcode: None,
            description: None,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let view = ProductView::new(product, today, 120);
        assert!(view.is_expired);
        assert!(!view.is_expiring);
        assert!(!view.is_low_stock);
    }
}
