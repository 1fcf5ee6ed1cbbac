use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::stock::{apply_movement, load_active_product, MovementDraft, StockCoordinator};
use crate::entities::{stock_movement, MovementType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Direction of a manual correction. Returns have their own recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    In,
    Out,
}

impl From<AdjustmentType> for MovementType {
    fn from(kind: AdjustmentType) -> Self {
        match kind {
            AdjustmentType::In => MovementType::In,
            AdjustmentType::Out => MovementType::Out,
        }
    }
}

fn reason_present(reason: &str) -> Result<(), ValidationError> {
    if reason.trim().is_empty() {
        return Err(ValidationError::new("reason"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordAdjustmentCommand {
    pub product_id: Uuid,
    pub movement_type: AdjustmentType,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    #[validate(custom = "reason_present", length(max = 500))]
    pub reason: String,
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct AdjustmentRecorder {
    coordinator: StockCoordinator,
    events: EventSender,
}

impl AdjustmentRecorder {
    pub fn new(coordinator: StockCoordinator, events: EventSender) -> Self {
        Self {
            coordinator,
            events,
        }
    }

    /// Applies an admin stock correction and returns its ledger entry.
    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = command.quantity))]
    pub async fn record_adjustment(
        &self,
        command: RecordAdjustmentCommand,
    ) -> Result<stock_movement::Model, ServiceError> {
        command.validate()?;

        let product_id = command.product_id;
        let (product, entry) = self
            .coordinator
            .run(product_id, move |uow| {
                let command = command.clone();
                Box::pin(async move {
                    let product = load_active_product(uow, command.product_id).await?;
                    let draft = MovementDraft {
                        movement_type: command.movement_type.into(),
                        quantity: command.quantity,
                        reason: command.reason.trim().to_string(),
                        user_id: Some(command.user_id),
                    };
                    apply_movement(uow, product, draft, Utc::now()).await
                })
            })
            .await?;

        counter!("salon_inventory.adjustments.recorded", 1);
        info!(
            movement_id = entry.id,
            movement_type = %entry.movement_type,
            new_stock = entry.new_stock,
            "Stock adjusted"
        );

        self.events.publish(Event::StockAdjusted {
            product_id,
            movement_type: entry.movement_type,
            quantity: entry.quantity,
            new_stock: entry.new_stock,
        });
        if entry.movement_type == MovementType::Out && product.is_low_stock() {
            self.events.publish(Event::LowStock {
                product_id,
                stock: product.stock,
                min_stock: product.min_stock,
            });
        }

        Ok(entry)
    }
}
