//! In-process store used by tests and local tooling.
//!
//! A unit of work stages its writes privately and publishes them under a single
//! lock at commit, after re-checking every product version it read. Faults can
//! be armed to fail a chosen write step, and conflicts can be forced on commit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    InventoryStore, LedgerCursor, LedgerRepository, MovementFilter, NewMovement,
    ProductRepository, ReturnFilter, ReturnRepository, SaleFilter, SaleRepository, SalesStats,
    UnitOfWork,
};
use crate::entities::{product, product_return, sale, stock_movement};
use crate::errors::ServiceError;

/// Write step at which an armed fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    SaveProduct,
    InsertSale,
    InsertReturn,
    AppendMovement,
    Commit,
}

#[derive(Default)]
struct Committed {
    products: HashMap<Uuid, product::Model>,
    sales: Vec<sale::Model>,
    returns: Vec<product_return::Model>,
    movements: Vec<stock_movement::Model>,
}

#[derive(Default)]
struct Faults {
    armed: HashSet<FaultPoint>,
    forced_conflicts: u32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Committed>>,
    faults: Arc<Mutex<Faults>>,
    movement_seq: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next write at `point` fail with a storage fault. One-shot.
    pub fn fail_next(&self, point: FaultPoint) {
        lock(&self.faults).armed.insert(point);
    }

    /// Makes the next `count` commits fail as if another writer got there first.
    pub fn force_conflicts(&self, count: u32) {
        lock(&self.faults).forced_conflicts = count;
    }

    pub fn sale_count(&self) -> usize {
        lock(&self.state).sales.len()
    }

    pub fn return_count(&self) -> usize {
        lock(&self.state).returns.len()
    }

    pub fn movement_count(&self) -> usize {
        lock(&self.state).movements.len()
    }

    fn trip(&self, point: FaultPoint) -> Result<(), ServiceError> {
        if lock(&self.faults).armed.remove(&point) {
            return Err(ServiceError::db_error(format!("injected fault at {:?}", point)));
        }
        Ok(())
    }

    fn take_forced_conflict(&self) -> bool {
        let mut faults = lock(&self.faults);
        if faults.forced_conflicts > 0 {
            faults.forced_conflicts -= 1;
            true
        } else {
            false
        }
    }
}

// A poisoned lock only means a test thread panicked mid-write; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum StagedProduct {
    Insert(product::Model),
    Update {
        model: product::Model,
        expected_version: i32,
    },
}

impl StagedProduct {
    fn model(&self) -> &product::Model {
        match self {
            StagedProduct::Insert(model) | StagedProduct::Update { model, .. } => model,
        }
    }
}

pub struct MemoryUnitOfWork {
    store: MemoryStore,
    products: Vec<StagedProduct>,
    sales: Vec<sale::Model>,
    returns: Vec<product_return::Model>,
    movements: Vec<stock_movement::Model>,
}

impl MemoryUnitOfWork {
    fn staged_product(&self, id: Uuid) -> Option<&product::Model> {
        self.products
            .iter()
            .rev()
            .map(StagedProduct::model)
            .find(|model| model.id == id)
    }

    fn staged_product_exists(&self, id: Uuid) -> bool {
        self.staged_product(id).is_some() || lock(&self.store.state).products.contains_key(&id)
    }
}

#[async_trait]
impl ProductRepository for MemoryUnitOfWork {
    async fn find_product_for_update(
        &mut self,
        id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        if let Some(model) = self.staged_product(id) {
            return Ok(Some(model.clone()));
        }
        Ok(lock(&self.store.state).products.get(&id).cloned())
    }

    async fn insert_product(&mut self, model: product::Model) -> Result<(), ServiceError> {
        if self.staged_product_exists(model.id) {
            return Err(ServiceError::db_error(format!(
                "duplicate product id {}",
                model.id
            )));
        }
        self.products.push(StagedProduct::Insert(model));
        Ok(())
    }

    async fn save_product(
        &mut self,
        mut model: product::Model,
        expected_version: i32,
    ) -> Result<product::Model, ServiceError> {
        self.store.trip(FaultPoint::SaveProduct)?;

        let current = match self.staged_product(model.id) {
            Some(staged) => Some(staged.version),
            None => lock(&self.store.state)
                .products
                .get(&model.id)
                .map(|p| p.version),
        };
        match current {
            Some(version) if version == expected_version => {}
            Some(_) => return Err(ServiceError::ConcurrencyConflict(model.id)),
            None => return Err(ServiceError::product_not_found(model.id)),
        }

        model.version = expected_version + 1;
        self.products.push(StagedProduct::Update {
            model: model.clone(),
            expected_version,
        });
        Ok(model)
    }
}

#[async_trait]
impl SaleRepository for MemoryUnitOfWork {
    async fn insert_sale(&mut self, sale: sale::Model) -> Result<(), ServiceError> {
        self.store.trip(FaultPoint::InsertSale)?;
        self.sales.push(sale);
        Ok(())
    }
}

#[async_trait]
impl ReturnRepository for MemoryUnitOfWork {
    async fn insert_return(&mut self, record: product_return::Model) -> Result<(), ServiceError> {
        self.store.trip(FaultPoint::InsertReturn)?;
        self.returns.push(record);
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for MemoryUnitOfWork {
    async fn append_movement(
        &mut self,
        entry: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        self.store.trip(FaultPoint::AppendMovement)?;
        let saved = stock_movement::Model {
            id: self.store.movement_seq.fetch_add(1, Ordering::SeqCst) + 1,
            product_id: entry.product_id,
            user_id: entry.user_id,
            movement_type: entry.movement_type,
            quantity: entry.quantity,
            previous_stock: entry.previous_stock,
            new_stock: entry.new_stock,
            reason: entry.reason,
            created_at: entry.created_at,
        };
        self.movements.push(saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let this = *self;
        this.store.trip(FaultPoint::Commit)?;

        if this.store.take_forced_conflict() {
            let id = this
                .products
                .first()
                .map(|staged| staged.model().id)
                .unwrap_or_else(Uuid::nil);
            return Err(ServiceError::ConcurrencyConflict(id));
        }

        let mut state = lock(&this.store.state);

        // Only the first staged update per product carries the version read
        // from committed state; later ones chain off it.
        let mut checked = HashSet::new();
        for staged in &this.products {
            match staged {
                StagedProduct::Insert(model) => {
                    if state.products.contains_key(&model.id) {
                        return Err(ServiceError::db_error(format!(
                            "duplicate product id {}",
                            model.id
                        )));
                    }
                    checked.insert(model.id);
                }
                StagedProduct::Update {
                    model,
                    expected_version,
                } => {
                    if !checked.insert(model.id) {
                        continue;
                    }
                    let committed = state.products.get(&model.id).map(|p| p.version);
                    if committed != Some(*expected_version) {
                        return Err(ServiceError::ConcurrencyConflict(model.id));
                    }
                }
            }
        }

        for staged in this.products {
            let model = match staged {
                StagedProduct::Insert(model) | StagedProduct::Update { model, .. } => model,
            };
            state.products.insert(model.id, model);
        }
        state.sales.extend(this.sales);
        state.returns.extend(this.returns);
        state.movements.extend(this.movements);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ServiceError> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            products: Vec::new(),
            sales: Vec::new(),
            returns: Vec::new(),
            movements: Vec::new(),
        }))
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(lock(&self.state).products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        let mut products: Vec<_> = lock(&self.state)
            .products
            .values()
            .filter(|p| !p.is_archived())
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
        after: Option<LedgerCursor>,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let mut page: Vec<_> = lock(&self.state)
            .movements
            .iter()
            .filter(|entry| filter.matches(entry))
            .filter(|entry| after.map_or(true, |cursor| cursor.precedes(entry)))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        page.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(page)
    }

    async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<sale::Model>, ServiceError> {
        let mut sales: Vec<_> = lock(&self.state)
            .sales
            .iter()
            .filter(|sale| filter.matches(sale))
            .cloned()
            .collect();
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            sales.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(sales)
    }

    async fn sales_stats(&self, filter: &SaleFilter) -> Result<SalesStats, ServiceError> {
        let state = lock(&self.state);
        let mut stats = SalesStats::default();
        for sale in state.sales.iter().filter(|sale| filter.matches(sale)) {
            stats.record(sale);
        }
        Ok(stats)
    }

    async fn list_returns(
        &self,
        filter: &ReturnFilter,
    ) -> Result<Vec<product_return::Model>, ServiceError> {
        let mut returns: Vec<_> = lock(&self.state)
            .returns
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        returns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            returns.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(returns)
    }
}
