use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::stock_movement;
use crate::errors::ServiceError;
use crate::store::{InventoryStore, LedgerCursor, MovementFilter};

pub const DEFAULT_PAGE_SIZE: u64 = 100;

struct PageState {
    cursor: Option<LedgerCursor>,
    exhausted: bool,
}

async fn next_page(
    store: Arc<dyn InventoryStore>,
    filter: MovementFilter,
    state: PageState,
    page_size: u64,
) -> Result<Option<(Vec<stock_movement::Model>, PageState)>, ServiceError> {
    if state.exhausted {
        return Ok(None);
    }
    let page = store.list_movements(&filter, state.cursor, page_size).await?;
    if page.is_empty() {
        return Ok(None);
    }
    let next = PageState {
        cursor: page.last().map(LedgerCursor::of),
        exhausted: (page.len() as u64) < page_size,
    };
    Ok(Some((page, next)))
}

/// Read side of the stock ledger. Entries are only ever appended by the
/// recorders, inside the same unit of work as the stock change they describe.
#[derive(Clone)]
pub struct StockLedgerService {
    store: Arc<dyn InventoryStore>,
    page_size: u64,
}

impl StockLedgerService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: Arc<dyn InventoryStore>, page_size: u64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Newest-first stream of matching entries, ties broken by insertion
    /// sequence. Pages are fetched on demand; each call starts over from the
    /// newest entry.
    pub fn list(
        &self,
        filter: MovementFilter,
    ) -> BoxStream<'static, Result<stock_movement::Model, ServiceError>> {
        let store = self.store.clone();
        let page_size = self.page_size;

        let initial = PageState {
            cursor: None,
            exhausted: false,
        };

        stream::try_unfold(initial, move |state| {
            next_page(store.clone(), filter.clone(), state, page_size)
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, ServiceError>)))
        .try_flatten()
        .boxed()
    }

    /// Collects up to `limit` entries from [`Self::list`].
    #[instrument(skip(self))]
    pub async fn recent(
        &self,
        filter: MovementFilter,
        limit: usize,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.list(filter).take(limit).try_collect().await
    }

    /// Stock implied by the ledger: the sum of every entry's signed delta.
    #[instrument(skip(self))]
    pub async fn replay_stock(&self, product_id: Uuid) -> Result<i64, ServiceError> {
        self.list(MovementFilter::for_product(product_id))
            .try_fold(0i64, |total, entry| async move {
                Ok(total + i64::from(entry.delta()))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MovementType;
    use crate::store::{MemoryStore, NewMovement};
    use chrono::{Duration, Utc};

    async fn append_all(store: &MemoryStore, product_id: Uuid, deltas: &[(MovementType, i32)]) {
        let base = Utc::now();
        let mut stock = 0;
        let mut uow = store.begin().await.unwrap();
        for (i, (kind, qty)) in deltas.iter().enumerate() {
            let previous = stock;
            stock += kind.signed(*qty);
            uow.append_movement(NewMovement {
                product_id,
                user_id: None,
                movement_type: *kind,
                quantity: *qty,
                previous_stock: previous,
                new_stock: stock,
                reason: "manual edit".into(),
                // Pairs of entries share a timestamp to exercise the id tie-break.
                created_at: base + Duration::milliseconds((i / 2) as i64),
            })
            .await
            .unwrap();
        }
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn pages_through_entries_newest_first() {
        let store = MemoryStore::new();
        let product_id = Uuid::new_v4();
        let ops: Vec<_> = (0..7).map(|_| (MovementType::In, 1)).collect();
        append_all(&store, product_id, &ops).await;

        let ledger = StockLedgerService::with_page_size(Arc::new(store), 3);
        let entries: Vec<_> = ledger
            .list(MovementFilter::for_product(product_id))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(entries.len(), 7);
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn listing_restarts_from_newest() {
        let store = MemoryStore::new();
        let product_id = Uuid::new_v4();
        append_all(&store, product_id, &[(MovementType::In, 5), (MovementType::Out, 2)]).await;

        let ledger = StockLedgerService::new(Arc::new(store));
        let first = ledger.recent(MovementFilter::for_product(product_id), 1).await.unwrap();
        let again = ledger.recent(MovementFilter::for_product(product_id), 1).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first[0].movement_type, MovementType::Out);
    }

    #[tokio::test]
    async fn filters_by_type_and_replays_signed_sum() {
        let store = MemoryStore::new();
        let product_id = Uuid::new_v4();
        append_all(
            &store,
            product_id,
            &[
                (MovementType::In, 10),
                (MovementType::Out, 4),
                (MovementType::Return, 2),
            ],
        )
        .await;

        let ledger = StockLedgerService::new(Arc::new(store));
        let outs: Vec<_> = ledger
            .list(MovementFilter {
                product_id: Some(product_id),
                movement_type: Some(MovementType::Out),
                ..Default::default()
            })
            .try_collect()
            .await
            .unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(ledger.replay_stock(product_id).await.unwrap(), 8);
    }
}
