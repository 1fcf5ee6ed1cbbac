// Stock write path
pub mod locks;
pub mod stock;

// Core inventory services
pub mod adjustments;
pub mod catalog;
pub mod ledger;
pub mod returns;
pub mod sales;

// Reporting and accounts
pub mod reports;
pub mod users;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::store::InventoryStore;

pub use adjustments::{AdjustmentRecorder, AdjustmentType, RecordAdjustmentCommand};
pub use catalog::{NewProduct, ProductCatalogService, ProductDetail, ProductUpdate, ProductView};
pub use ledger::StockLedgerService;
pub use reports::{ReportService, SalesStats, StockAlerts};
pub use returns::{RecordReturnCommand, ReturnRecorder};
pub use sales::{RecordSaleCommand, SaleRecorder};
pub use stock::StockCoordinator;
pub use users::{LoginRequest, LoginResponse, NewUser, UserService};

/// Tuning knobs shared by the inventory services.
#[derive(Debug, Clone, Copy)]
pub struct InventorySettings {
    pub conflict_retries: u32,
    pub expiry_warning_days: i64,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            expiry_warning_days: 120,
        }
    }
}

impl From<&AppConfig> for InventorySettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            conflict_retries: cfg.stock_conflict_retries,
            expiry_warning_days: cfg.expiry_warning_days,
        }
    }
}

/// The inventory services wired over one store. All stock writers share a
/// single coordinator, and with it a single per-product lock map.
#[derive(Clone)]
pub struct InventoryServices {
    pub catalog: ProductCatalogService,
    pub ledger: StockLedgerService,
    pub sales: SaleRecorder,
    pub returns: ReturnRecorder,
    pub adjustments: AdjustmentRecorder,
    pub reports: ReportService,
}

impl InventoryServices {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        events: EventSender,
        settings: InventorySettings,
    ) -> Self {
        let coordinator = StockCoordinator::new(store.clone(), settings.conflict_retries);
        Self {
            catalog: ProductCatalogService::new(
                coordinator.clone(),
                events.clone(),
                settings.expiry_warning_days,
            ),
            ledger: StockLedgerService::new(store.clone()),
            sales: SaleRecorder::new(coordinator.clone(), events.clone()),
            returns: ReturnRecorder::new(coordinator.clone(), events.clone()),
            adjustments: AdjustmentRecorder::new(coordinator, events),
            reports: ReportService::new(store, settings.expiry_warning_days),
        }
    }
}
