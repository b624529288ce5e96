use {
    super::projector::{OrderStatusProjector, Projection},
    crate::domain::error::ReconcileError,
    crate::domain::id::{OrderId, PaymentId},
    crate::domain::ledger::{TransactionField, TransactionStore},
    crate::domain::order::{Order, OrderStatus},
    crate::domain::provider::PaymentGatewayClient,
    crate::domain::store::OrderStore,
    crate::domain::transaction::{Transaction, TransactionState, TransactionType},
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    Applied(Projection),
    /// Transaction number (in this state) was already folded into the order.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Fixed-interval retry budget for failed-order recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureRecovery {
    NotFailed,
    Recovered(u64),
    TimedOut,
    Cancelled,
}

/// Feeds provider transactions through the ledger and the projector.
pub struct Reconciler {
    ledger: Arc<dyn TransactionStore>,
    projector: OrderStatusProjector,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGatewayClient>,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn TransactionStore>,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGatewayClient>,
    ) -> Self {
        Self {
            ledger,
            projector: OrderStatusProjector::new(orders.clone(), gateway.clone()),
            orders,
            gateway,
        }
    }

    /// Apply exactly one transaction to the order, at most once.
    #[tracing::instrument(
        name = "process_transaction",
        skip_all,
        fields(order_id = %order_id, transaction_number = transaction.number)
    )]
    pub async fn process_transaction(
        &self,
        order_id: &OrderId,
        transaction: &Transaction,
    ) -> Result<ProcessResult, ReconcileError> {
        // Reject before recording so a retry reports the same error.
        if !transaction.transaction_type.is_known() {
            return Err(ReconcileError::UnknownTransactionType(
                transaction.transaction_type.to_string(),
            ));
        }

        // The order is read, recorded and projected under one lease, so two
        // transactions for the same order never decide from the same
        // snapshot. Any error below drops the lease and nothing is recorded.
        let mut lease = self.ledger.lock_order(order_id).await?;

        let mut order = self.orders.get_order(order_id).await?;
        self.resolve_checkout_payment(&mut order).await?;

        let outcome = lease.record_if_new(transaction).await?;
        if !outcome.is_applied() {
            tracing::info!(state = %transaction.state, "duplicate transaction, already applied");
            return Ok(ProcessResult::Duplicate);
        }

        let projection = self.projector.apply(&order, transaction).await?;
        lease.commit().await?;
        Ok(ProcessResult::Applied(projection))
    }

    /// Fetch the order's transactions from the provider and apply the new
    /// ones. With `transaction_number`, only that transaction is applied.
    ///
    /// A failing transaction is logged and skipped; the rest of the batch
    /// still runs.
    pub async fn fetch_transactions_and_update_order(
        &self,
        order_id: &OrderId,
        transaction_number: Option<u64>,
    ) -> Result<BatchSummary, ReconcileError> {
        let order = self.orders.get_order(order_id).await?;
        let payment_id = self.payment_id_for(&order).await?;

        let mut transactions = self.gateway.fetch_transactions(&payment_id).await?;

        if let Some(number) = transaction_number {
            match transactions.iter().position(|t| t.number == number) {
                Some(pos) => transactions = vec![transactions.swap_remove(pos)],
                None => {
                    let known = self
                        .ledger
                        .find_in_order(order_id, TransactionField::Number, &number.to_string())
                        .await?;
                    if known.is_none() {
                        return Err(ReconcileError::TransactionNotFound(number));
                    }
                    tracing::info!(order_id = %order_id, transaction_number = number, "transaction no longer listed, already recorded");
                    return Ok(BatchSummary {
                        duplicates: 1,
                        ..BatchSummary::default()
                    });
                }
            }
        }

        let mut summary = BatchSummary::default();
        for transaction in &transactions {
            match self.process_transaction(order_id, transaction).await {
                Ok(ProcessResult::Applied(_)) => summary.applied += 1,
                Ok(ProcessResult::Duplicate) => summary.duplicates += 1,
                Err(e) => {
                    tracing::error!(
                        order_id = %order_id,
                        transaction_number = transaction.number,
                        error = %e,
                        "failed to process transaction, continuing"
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(order_id = %order_id, ?summary, "transactions reconciled");
        Ok(summary)
    }

    /// Poll a failed order's transactions until a completed authorization or
    /// sale shows up (the shopper retried), then apply it.
    pub async fn update_transactions_on_failure(
        &self,
        order_id: &OrderId,
        policy: RetryPolicy,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<FailureRecovery, ReconcileError> {
        let order = self.orders.get_order(order_id).await?;
        if order.status != OrderStatus::Failed {
            return Ok(FailureRecovery::NotFailed);
        }

        for attempt in 1..=policy.max_attempts {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!(order_id = %order_id, attempt, "failure recovery cancelled");
                    return Ok(FailureRecovery::Cancelled);
                }
                _ = tokio::time::sleep(policy.interval) => {}
            }

            let payment_id = match self.payment_id_for(&order).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(order_id = %order_id, attempt, error = %e, "no payment yet");
                    continue;
                }
            };

            let transactions = match self.gateway.fetch_transactions(&payment_id).await {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(order_id = %order_id, attempt, error = %e, "transaction poll failed");
                    continue;
                }
            };

            for tx in transactions.iter().filter(|t| {
                matches!(
                    t.transaction_type,
                    TransactionType::Authorization | TransactionType::Sale
                )
            }) {
                match tx.state {
                    TransactionState::Completed => {
                        if order.is_checkout() {
                            self.orders.set_payment_id(order_id, &payment_id).await?;
                        }
                        self.fetch_transactions_and_update_order(order_id, Some(tx.number))
                            .await?;
                        return Ok(FailureRecovery::Recovered(tx.number));
                    }
                    TransactionState::Failed => {
                        tracing::warn!(
                            order_id = %order_id,
                            payment_id = %payment_id,
                            transaction_id = %tx.id,
                            transaction_number = tx.number,
                            reason = %tx.failed_details(),
                            "failed transaction"
                        );
                    }
                    _ => {}
                }
            }
        }

        Ok(FailureRecovery::TimedOut)
    }

    async fn payment_id_for(&self, order: &Order) -> Result<PaymentId, ReconcileError> {
        if order.is_checkout() {
            let payment_order_id = order.require_payment_order_id()?;
            return self
                .gateway
                .payment_id_by_payment_order(payment_order_id)
                .await?
                .ok_or_else(|| ReconcileError::MissingCorrelationId {
                    order_id: order.order_id.to_string(),
                    field: "payment id",
                });
        }
        Ok(order.require_payment_id()?.clone())
    }

    /// Checkout orders learn their payment id late; look it up and keep it.
    async fn resolve_checkout_payment(&self, order: &mut Order) -> Result<(), ReconcileError> {
        if order.payment_id.is_some() || !order.is_checkout() || order.payment_order_id.is_none() {
            return Ok(());
        }

        let payment_id = self.payment_id_for(order).await?;
        self.orders
            .set_payment_id(&order.order_id, &payment_id)
            .await?;
        order.payment_id = Some(payment_id);
        Ok(())
    }
}
