use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::stock::{
    adjust_stock, load_active_product, record_movement, MovementDraft, StockCoordinator,
    REASON_SALE,
};
use crate::auth::Caller;
use crate::entities::{fits_money_column, sale, DeliveryType, MovementType, PaymentMethod};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::store::SaleFilter;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordSaleCommand {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    pub payment_method: PaymentMethod,
    pub delivery_type: DeliveryType,
    pub seller_id: Uuid,
}

/// `unit_price × quantity`, rejected when it overflows or cannot be stored
/// in a money column.
fn sale_total(unit_price: Decimal, quantity: i32) -> Result<Decimal, ServiceError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .filter(|total| fits_money_column(*total))
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "sale total for {} units at {} exceeds the largest recordable amount",
                quantity, unit_price
            ))
        })
}

/// Records sales against stock.
///
/// A sale re-reads the product under its lock, rejects expired or
/// under-stocked products, snapshots the current sell price, and then writes
/// the stock decrement, the sale and its "out" ledger entry as one unit.
/// Identical calls are not deduplicated: each one is a separate sale.
#[derive(Clone)]
pub struct SaleRecorder {
    coordinator: StockCoordinator,
    events: EventSender,
}

impl SaleRecorder {
    pub fn new(coordinator: StockCoordinator, events: EventSender) -> Self {
        Self {
            coordinator,
            events,
        }
    }

    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = command.quantity))]
    pub async fn record_sale(&self, command: RecordSaleCommand) -> Result<sale::Model, ServiceError> {
        command.validate()?;

        let product_id = command.product_id;
        let (sale, product) = self
            .coordinator
            .run(product_id, move |uow| {
                let command = command.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let product = load_active_product(uow, command.product_id).await?;
                    if product.is_expired_on(now.date_naive()) {
                        return Err(ServiceError::ExpiredProduct(product.id));
                    }

                    let unit_price = product.sell_price;
                    let total_price = sale_total(unit_price, command.quantity)?;
                    let previous_stock = product.stock;

                    let updated = adjust_stock(uow, product, -command.quantity, now).await?;

                    let sale = sale::Model {
                        id: Uuid::new_v4(),
                        product_id: command.product_id,
                        seller_id: command.seller_id,
                        quantity: command.quantity,
                        unit_price,
                        total_price,
                        payment_method: command.payment_method,
                        delivery_type: command.delivery_type,
                        created_at: now,
                    };
                    uow.insert_sale(sale.clone()).await?;

                    let draft = MovementDraft {
                        movement_type: MovementType::Out,
                        quantity: command.quantity,
                        reason: REASON_SALE.to_string(),
                        user_id: Some(command.seller_id),
                    };
                    record_movement(uow, previous_stock, &updated, draft, now).await?;

                    Ok((sale, updated))
                })
            })
            .await?;

        counter!("salon_inventory.sales.recorded", 1);
        info!(
            sale_id = %sale.id,
            remaining_stock = product.stock,
            total = %sale.total_price,
            "Sale recorded"
        );

        self.events.publish(Event::SaleRecorded {
            sale_id: sale.id,
            product_id,
            quantity: sale.quantity,
            total_price: sale.total_price,
        });
        if product.is_low_stock() {
            self.events.publish(Event::LowStock {
                product_id,
                stock: product.stock,
                min_stock: product.min_stock,
            });
        }

        Ok(sale)
    }

    /// Sales newest first. Sellers only ever see their own sales.
    #[instrument(skip(self))]
    pub async fn list_sales(
        &self,
        mut filter: SaleFilter,
        caller: Caller,
    ) -> Result<Vec<sale::Model>, ServiceError> {
        scope_to_caller(&mut filter, &caller);
        self.coordinator.store().list_sales(&filter).await
    }
}

pub(crate) fn scope_to_caller(filter: &mut SaleFilter, caller: &Caller) {
    if !caller.is_admin() {
        filter.seller_id = Some(caller.user_id);
    }
}
