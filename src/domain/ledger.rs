use {
    super::id::OrderId,
    super::store::StoreFuture,
    super::transaction::{Transaction, TransactionState},
    std::collections::BTreeSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First sighting of this transaction (or of a new state of it): apply it.
    Applied,
    /// Already folded into the order; do nothing.
    Duplicate,
}

impl RecordOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Searchable transaction fields for [`TransactionStore::find_by_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionField {
    Number,
    Id,
    PayeeReference,
}

impl TransactionField {
    pub fn matches(&self, transaction: &Transaction, value: &str) -> bool {
        match self {
            Self::Number => transaction.number.to_string() == value,
            Self::Id => transaction.id == value,
            Self::PayeeReference => transaction.payee_reference.as_deref() == Some(value),
        }
    }
}

/// Decide whether an observation of `incoming` is new, given the states
/// already recorded for the same transaction number.
///
/// A number seen in a terminal state is frozen. A number seen only in
/// transient states is applied again once per new state, so a capture that
/// was first seen `Pending` still settles when it turns `Completed`.
pub fn is_new_observation(recorded: &[TransactionState], incoming: TransactionState) -> bool {
    !recorded
        .iter()
        .any(|state| state.is_terminal() || *state == incoming)
}

/// Exclusive hold on one order's ledger.
///
/// Observations recorded through the lease become visible on
/// [`OrderLease::commit`]; dropping the lease discards them and releases
/// the order.
pub trait OrderLease<'a>: Send {
    /// Check against committed and staged observations, then stage.
    fn record_if_new<'b>(
        &'b mut self,
        transaction: &'b Transaction,
    ) -> StoreFuture<'b, RecordOutcome>;

    fn commit(self: Box<Self>) -> StoreFuture<'a, ()>;
}

pub type Lease<'a> = Box<dyn OrderLease<'a> + 'a>;

/// Append-only, de-duplicated ledger of transactions observed per order.
pub trait TransactionStore: Send + Sync {
    /// Wait for exclusive access to the order. Only one lease per order is
    /// live at a time.
    fn lock_order<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, Lease<'a>>;

    /// Atomically check and record. Two concurrent calls for the same
    /// observation never both return [`RecordOutcome::Applied`].
    fn record_if_new<'a>(
        &'a self,
        order_id: &'a OrderId,
        transaction: &'a Transaction,
    ) -> StoreFuture<'a, RecordOutcome> {
        Box::pin(async move {
            let mut lease = self.lock_order(order_id).await?;
            let outcome = lease.record_if_new(transaction).await?;
            lease.commit().await?;
            Ok(outcome)
        })
    }

    /// Most recent recorded transaction whose `field` equals `value`.
    fn find_by_field<'a>(
        &'a self,
        field: TransactionField,
        value: &'a str,
    ) -> StoreFuture<'a, Option<Transaction>>;

    /// Same as [`TransactionStore::find_by_field`], limited to one order.
    fn find_in_order<'a>(
        &'a self,
        order_id: &'a OrderId,
        field: TransactionField,
        value: &'a str,
    ) -> StoreFuture<'a, Option<Transaction>>;

    /// Transaction numbers already folded into the order.
    fn applied_numbers<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, BTreeSet<u64>>;
}
