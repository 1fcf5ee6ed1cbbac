use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, EntityTrait, NotSet, QueryFilter, QueryOrder, QuerySelect,
    Select, Set, TransactionTrait,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    InventoryStore, LedgerCursor, LedgerRepository, MovementFilter, NewMovement,
    ProductRepository, ReturnFilter, ReturnRepository, SaleFilter, SaleRepository, SalesStats,
    UnitOfWork,
};
use crate::entities::{product, product_return, sale, stock_movement};
use crate::errors::ServiceError;

/// Relational store backed by SeaORM. Works against SQLite and PostgreSQL.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

pub struct SeaOrmUnitOfWork {
    txn: DatabaseTransaction,
}

fn product_columns(model: &product::Model) -> product::ActiveModel {
    product::ActiveModel {
        id: Set(model.id),
        name: Set(model.name.clone()),
        category: Set(model.category.clone()),
        brand: Set(model.brand.clone()),
        buy_price: Set(model.buy_price),
        sell_price: Set(model.sell_price),
        stock: Set(model.stock),
        min_stock: Set(model.min_stock),
        expiry_date: Set(model.expiry_date),
        barcode: Set(model.barcode.clone()),
        description: Set(model.description.clone()),
        version: Set(model.version),
        created_at: Set(model.created_at),
        updated_at: Set(model.updated_at),
        deleted_at: Set(model.deleted_at),
    }
}

fn sales_matching(filter: &SaleFilter) -> Select<sale::Entity> {
    use sale::Column;

    let mut query = sale::Entity::find();
    if let Some(product_id) = filter.product_id {
        query = query.filter(Column::ProductId.eq(product_id));
    }
    if let Some(seller_id) = filter.seller_id {
        query = query.filter(Column::SellerId.eq(seller_id));
    }
    if let Some(from) = filter.from {
        query = query.filter(Column::CreatedAt.gte(from));
    }
    if let Some(to) = filter.to {
        query = query.filter(Column::CreatedAt.lte(to));
    }
    query
}

#[async_trait]
impl ProductRepository for SeaOrmUnitOfWork {
    async fn find_product_for_update(
        &mut self,
        id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        let mut query = product::Entity::find_by_id(id);
        if self.txn.get_database_backend() != DbBackend::Sqlite {
            query = query.lock_exclusive();
        }
        Ok(query.one(&self.txn).await?)
    }

    async fn insert_product(&mut self, model: product::Model) -> Result<(), ServiceError> {
        product_columns(&model).insert(&self.txn).await?;
        Ok(())
    }

    async fn save_product(
        &mut self,
        mut model: product::Model,
        expected_version: i32,
    ) -> Result<product::Model, ServiceError> {
        model.version = expected_version + 1;

        let mut changes = product_columns(&model);
        changes.id = NotSet;
        changes.created_at = NotSet;

        let result = product::Entity::update_many()
            .set(changes)
            .filter(product::Column::Id.eq(model.id))
            .filter(product::Column::Version.eq(expected_version))
            .exec(&self.txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(product_id = %model.id, expected_version, "product version moved underneath writer");
            return Err(ServiceError::ConcurrencyConflict(model.id));
        }

        Ok(model)
    }
}

#[async_trait]
impl SaleRepository for SeaOrmUnitOfWork {
    async fn insert_sale(&mut self, sale: sale::Model) -> Result<(), ServiceError> {
        sale::ActiveModel {
            id: Set(sale.id),
            product_id: Set(sale.product_id),
            seller_id: Set(sale.seller_id),
            quantity: Set(sale.quantity),
            unit_price: Set(sale.unit_price),
            total_price: Set(sale.total_price),
            payment_method: Set(sale.payment_method),
            delivery_type: Set(sale.delivery_type),
            created_at: Set(sale.created_at),
        }
        .insert(&self.txn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReturnRepository for SeaOrmUnitOfWork {
    async fn insert_return(&mut self, record: product_return::Model) -> Result<(), ServiceError> {
        product_return::ActiveModel {
            id: Set(record.id),
            product_id: Set(record.product_id),
            user_id: Set(record.user_id),
            quantity: Set(record.quantity),
            reason: Set(record.reason),
            created_at: Set(record.created_at),
        }
        .insert(&self.txn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for SeaOrmUnitOfWork {
    async fn append_movement(
        &mut self,
        entry: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let saved = stock_movement::ActiveModel {
            id: NotSet,
            product_id: Set(entry.product_id),
            user_id: Set(entry.user_id),
            movement_type: Set(entry.movement_type),
            quantity: Set(entry.quantity),
            previous_stock: Set(entry.previous_stock),
            new_stock: Set(entry.new_stock),
            reason: Set(entry.reason),
            created_at: Set(entry.created_at),
        }
        .insert(&self.txn)
        .await?;
        Ok(saved)
    }
}

#[async_trait]
impl UnitOfWork for SeaOrmUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let SeaOrmUnitOfWork { txn } = *self;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        let SeaOrmUnitOfWork { txn } = *self;
        txn.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for SeaOrmStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ServiceError> {
        let txn = self.db.begin().await?;
        debug!("stock transaction started");
        Ok(Box::new(SeaOrmUnitOfWork { txn }))
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::DeletedAt.is_null())
            .order_by_asc(product::Column::Name)
            .order_by_asc(product::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
        after: Option<LedgerCursor>,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        use stock_movement::Column;

        let mut condition = Condition::all();
        if let Some(product_id) = filter.product_id {
            condition = condition.add(Column::ProductId.eq(product_id));
        }
        if let Some(kind) = filter.movement_type {
            condition = condition.add(Column::MovementType.eq(kind));
        }
        if let Some(from) = filter.from {
            condition = condition.add(Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            condition = condition.add(Column::CreatedAt.lte(to));
        }
        if let Some(cursor) = after {
            condition = condition.add(
                Condition::any()
                    .add(Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(Column::CreatedAt.eq(cursor.created_at))
                            .add(Column::Id.lt(cursor.id)),
                    ),
            );
        }

        Ok(stock_movement::Entity::find()
            .filter(condition)
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }

    async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<sale::Model>, ServiceError> {
        use sale::Column;

        let mut query = sales_matching(filter);
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        Ok(query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    async fn sales_stats(&self, filter: &SaleFilter) -> Result<SalesStats, ServiceError> {
        let rows = sales_matching(filter).stream(self.db.as_ref()).await?;
        let stats = rows
            .try_fold(SalesStats::default(), |mut stats, sale| async move {
                stats.record(&sale);
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }

    async fn list_returns(
        &self,
        filter: &ReturnFilter,
    ) -> Result<Vec<product_return::Model>, ServiceError> {
        use product_return::Column;

        let mut query = product_return::Entity::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(Column::ProductId.eq(product_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(Column::CreatedAt.lte(to));
        }

        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        Ok(query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .all(self.db.as_ref())
            .await?)
    }
}
