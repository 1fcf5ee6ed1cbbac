use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per product id. Holding the guard serializes every
/// stock-affecting write on that product within this process.
#[derive(Clone, Default)]
pub struct ProductLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, product_id: Uuid) -> ProductGuard {
        let lock = self
            .locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ProductGuard {
            product_id,
            locks: self.locks.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

/// Held lock on one product. Dropping the last holder with no waiters
/// removes the product's entry from the map.
pub struct ProductGuard {
    product_id: Uuid,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ProductGuard {
    fn drop(&mut self) {
        // map + this guard; any waiter holds a third clone
        self.locks
            .remove_if(&self.product_id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_product_waits_for_guard() {
        let locks = ProductLocks::new();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire(id).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_products_do_not_contend() {
        let locks = ProductLocks::new();
        let a = locks.acquire(Uuid::new_v4()).await;
        let b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.tracked(), 2);

        drop(a);
        drop(b);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = ProductLocks::new();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire(id).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
