use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::MovementType;

/// Domain notifications published after a stock transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductArchived(Uuid),
    SaleRecorded {
        sale_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        total_price: Decimal,
    },
    ReturnRecorded {
        return_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    StockAdjusted {
        product_id: Uuid,
        movement_type: MovementType,
        quantity: i32,
        new_stock: i32,
    },
    LowStock {
        product_id: Uuid,
        stock: i32,
        min_stock: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queues an event without waiting. The write it describes is already
    /// committed, so a full or closed channel is logged and otherwise ignored.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", e);
            metrics::counter!("salon_inventory.events.dropped", 1);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EventRecord<'a> {
    event: &'a Event,
    received_at: DateTime<Utc>,
}

/// Drains the event channel until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStock {
                product_id,
                stock,
                min_stock,
            } => {
                warn!(
                    product_id = %product_id,
                    stock,
                    min_stock,
                    "Product at or below its minimum stock"
                );
                metrics::counter!("salon_inventory.stock.low_stock_alerts", 1);
            }
            Event::SaleRecorded { .. } => {
                metrics::counter!("salon_inventory.events.sales", 1);
            }
            Event::ReturnRecorded { .. } => {
                metrics::counter!("salon_inventory.events.returns", 1);
            }
            _ => {}
        }

        let record = EventRecord {
            event: &event,
            received_at: Utc::now(),
        };
        match serde_json::to_string(&record) {
            Ok(json) => info!(target: "salon_inventory::events", "{}", json),
            Err(e) => warn!("Failed to serialize event {:?}: {}", event, e),
        }
    }

    info!("Event processing loop stopped");
}
