use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::stock::{
    adjust_stock, load_active_product, record_movement, return_reason, MovementDraft,
    StockCoordinator,
};
use crate::entities::{product_return, MovementType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::store::ReturnFilter;

fn reason_present(reason: &str) -> Result<(), ValidationError> {
    if reason.trim().is_empty() {
        let mut err = ValidationError::new("reason");
        err.message = Some("a return needs a reason".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordReturnCommand {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    #[validate(custom = "reason_present", length(max = 500))]
    pub reason: String,
    pub user_id: Uuid,
}

/// Records customer returns. Returned units go straight back into stock;
/// the quantity is not checked against what was sold.
#[derive(Clone)]
pub struct ReturnRecorder {
    coordinator: StockCoordinator,
    events: EventSender,
}

impl ReturnRecorder {
    pub fn new(coordinator: StockCoordinator, events: EventSender) -> Self {
        Self {
            coordinator,
            events,
        }
    }

    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = command.quantity))]
    pub async fn record_return(
        &self,
        command: RecordReturnCommand,
    ) -> Result<product_return::Model, ServiceError> {
        command.validate()?;

        let product_id = command.product_id;
        let (record, new_stock) = self
            .coordinator
            .run(product_id, move |uow| {
                let command = command.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let product = load_active_product(uow, command.product_id).await?;
                    let reason = command.reason.trim().to_string();

                    let record = product_return::Model {
                        id: Uuid::new_v4(),
                        product_id: command.product_id,
                        user_id: command.user_id,
                        quantity: command.quantity,
                        reason: reason.clone(),
                        created_at: now,
                    };
                    uow.insert_return(record.clone()).await?;

                    let previous_stock = product.stock;
                    let updated = adjust_stock(uow, product, command.quantity, now).await?;

                    let draft = MovementDraft {
                        movement_type: MovementType::Return,
                        quantity: command.quantity,
                        reason: return_reason(&reason),
                        user_id: Some(command.user_id),
                    };
                    record_movement(uow, previous_stock, &updated, draft, now).await?;

                    Ok((record, updated.stock))
                })
            })
            .await?;

        counter!("salon_inventory.returns.recorded", 1);
        info!(return_id = %record.id, new_stock, "Return recorded");

        self.events.publish(Event::ReturnRecorded {
            return_id: record.id,
            product_id,
            quantity: record.quantity,
        });

        Ok(record)
    }

    /// Returns newest first.
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        filter: ReturnFilter,
    ) -> Result<Vec<product_return::Model>, ServiceError> {
        self.coordinator.store().list_returns(&filter).await
    }
}
