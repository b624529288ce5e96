use {
    crate::domain::id::OrderId,
    crate::domain::ledger::{
        Lease, OrderLease, RecordOutcome, TransactionField, TransactionStore, is_new_observation,
    },
    crate::domain::store::StoreFuture,
    crate::domain::transaction::{Transaction, TransactionState},
    std::collections::{BTreeSet, HashMap},
    std::sync::Arc,
    tokio::sync::{Mutex, OwnedMutexGuard},
};

#[derive(Debug, Default)]
struct Ledger {
    /// order -> transaction number -> observations in arrival order.
    orders: HashMap<OrderId, HashMap<u64, Vec<(TransactionState, Transaction)>>>,
    /// Every observation with its order, newest last, for lookups by field.
    log: Vec<(OrderId, Transaction)>,
}

impl Ledger {
    fn states(&self, order_id: &OrderId, number: u64) -> Vec<TransactionState> {
        self.orders
            .get(order_id)
            .and_then(|numbers| numbers.get(&number))
            .map(|observations| observations.iter().map(|(state, _)| *state).collect())
            .unwrap_or_default()
    }

    fn find<'a>(
        &'a self,
        order_id: Option<&OrderId>,
        field: TransactionField,
        value: &str,
    ) -> Option<&'a Transaction> {
        self.log
            .iter()
            .rev()
            .filter(|(owner, _)| order_id.is_none_or(|id| id == owner))
            .map(|(_, transaction)| transaction)
            .find(|t| field.matches(t, value))
    }
}

/// In-process transaction ledger. Each order has its own async lock, held
/// by a [`MemoryLease`] until it commits or is dropped.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    inner: Mutex<Ledger>,
    order_locks: Mutex<HashMap<OrderId, Arc<Mutex<()>>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observations recorded for the order, across all numbers.
    pub async fn observation_count(&self, order_id: &OrderId) -> usize {
        let ledger = self.inner.lock().await;
        ledger
            .orders
            .get(order_id)
            .map(|numbers| numbers.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

struct MemoryLease<'a> {
    store: &'a InMemoryTransactionStore,
    order_id: OrderId,
    staged: Vec<Transaction>,
    guard: OwnedMutexGuard<()>,
}

impl<'a> OrderLease<'a> for MemoryLease<'a> {
    fn record_if_new<'b>(
        &'b mut self,
        transaction: &'b Transaction,
    ) -> StoreFuture<'b, RecordOutcome> {
        Box::pin(async move {
            let mut recorded = self
                .store
                .inner
                .lock()
                .await
                .states(&self.order_id, transaction.number);
            recorded.extend(
                self.staged
                    .iter()
                    .filter(|staged| staged.number == transaction.number)
                    .map(|staged| staged.state),
            );

            if !is_new_observation(&recorded, transaction.state) {
                return Ok(RecordOutcome::Duplicate);
            }
            self.staged.push(transaction.clone());
            Ok(RecordOutcome::Applied)
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'a, ()> {
        let MemoryLease {
            store,
            order_id,
            staged,
            guard,
        } = *self;

        Box::pin(async move {
            let mut ledger = store.inner.lock().await;
            for transaction in staged {
                ledger
                    .orders
                    .entry(order_id.clone())
                    .or_default()
                    .entry(transaction.number)
                    .or_default()
                    .push((transaction.state, transaction.clone()));
                ledger.log.push((order_id.clone(), transaction));
            }
            drop(ledger);
            drop(guard);
            Ok(())
        })
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn lock_order<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, Lease<'a>> {
        Box::pin(async move {
            let order_lock = self
                .order_locks
                .lock()
                .await
                .entry(order_id.clone())
                .or_default()
                .clone();
            let guard = order_lock.lock_owned().await;

            let lease: Lease<'a> = Box::new(MemoryLease {
                store: self,
                order_id: order_id.clone(),
                staged: Vec::new(),
                guard,
            });
            Ok(lease)
        })
    }

    fn find_by_field<'a>(
        &'a self,
        field: TransactionField,
        value: &'a str,
    ) -> StoreFuture<'a, Option<Transaction>> {
        Box::pin(async move {
            let ledger = self.inner.lock().await;
            Ok(ledger.find(None, field, value).cloned())
        })
    }

    fn find_in_order<'a>(
        &'a self,
        order_id: &'a OrderId,
        field: TransactionField,
        value: &'a str,
    ) -> StoreFuture<'a, Option<Transaction>> {
        Box::pin(async move {
            let ledger = self.inner.lock().await;
            Ok(ledger.find(Some(order_id), field, value).cloned())
        })
    }

    fn applied_numbers<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, BTreeSet<u64>> {
        Box::pin(async move {
            let ledger = self.inner.lock().await;
            Ok(ledger
                .orders
                .get(order_id)
                .map(|numbers| numbers.keys().copied().collect())
                .unwrap_or_default())
        })
    }
}
