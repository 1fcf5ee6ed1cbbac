use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use super::catalog::ProductView;
use super::sales::scope_to_caller;
use crate::auth::Caller;
use crate::errors::ServiceError;
use crate::store::{InventoryStore, SaleFilter};

pub use crate::store::{Breakdown, SalesStats};

#[derive(Debug, Clone, Serialize)]
pub struct StockAlerts {
    pub low_stock: Vec<ProductView>,
    pub expiring: Vec<ProductView>,
    pub expired: Vec<ProductView>,
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn InventoryStore>,
    expiry_warning_days: i64,
}

impl ReportService {
    pub fn new(store: Arc<dyn InventoryStore>, expiry_warning_days: i64) -> Self {
        Self {
            store,
            expiry_warning_days,
        }
    }

    /// Totals over the filtered sales, aggregated by the store. Sellers only
    /// see their own figures.
    #[instrument(skip(self))]
    pub async fn sales_stats(
        &self,
        mut filter: SaleFilter,
        caller: Caller,
    ) -> Result<SalesStats, ServiceError> {
        scope_to_caller(&mut filter, &caller);
        filter.limit = None;
        self.store.sales_stats(&filter).await
    }

    #[instrument(skip(self))]
    pub async fn stock_alerts(&self) -> Result<StockAlerts, ServiceError> {
        let today = Utc::now().date_naive();
        let mut alerts = StockAlerts {
            low_stock: Vec::new(),
            expiring: Vec::new(),
            expired: Vec::new(),
        };

        for product in self.store.list_products().await? {
            let view = ProductView::new(product, today, self.expiry_warning_days);
            if view.is_low_stock {
                alerts.low_stock.push(view.clone());
            }
            if view.is_expired {
                alerts.expired.push(view);
            } else if view.is_expiring {
                alerts.expiring.push(view);
            }
        }

        Ok(alerts)
    }
}
