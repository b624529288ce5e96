use {
    super::reconciler::{ProcessResult, Reconciler},
    crate::domain::error::ReconcileError,
    crate::domain::id::OrderId,
    crate::domain::money::MoneyAmount,
    crate::domain::order::{Order, OrderStatus, PaymentMethod},
    crate::domain::provider::{
        PaymentGatewayClient, TransactionOperation, TransactionRequest, TransactionTarget,
    },
    crate::domain::store::OrderStore,
    crate::domain::transaction::{Transaction, TransactionType},
    serde::Serialize,
    std::sync::Arc,
    uuid::Uuid,
};

const ABORT_REL: &str = "update-payment-abort";
const PAYEE_REFERENCE_MAX_LEN: usize = 30;

/// Result of a capture, cancel or refund request.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub transaction: Transaction,
    pub duplicate: bool,
}

/// Capture / cancel / refund / abort for one order, with remote eligibility
/// checks in front of every mutating call.
pub struct OrderActionService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGatewayClient>,
    reconciler: Arc<Reconciler>,
}

impl OrderActionService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGatewayClient>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            orders,
            gateway,
            reconciler,
        }
    }

    /// False whenever eligibility cannot be confirmed.
    pub async fn can_capture(&self, order_id: &OrderId) -> bool {
        self.remaining(order_id, "capture", |info| info.remaining_capture_amount)
            .await
            .is_some_and(|remaining| remaining.is_positive())
    }

    /// False whenever eligibility cannot be confirmed.
    pub async fn can_cancel(&self, order_id: &OrderId) -> bool {
        self.remaining(order_id, "cancel", |info| info.remaining_cancellation_amount)
            .await
            .is_some_and(|remaining| remaining.is_positive())
    }

    /// False whenever eligibility cannot be confirmed, or when `amount`
    /// (default: the order total) exceeds what is left to refund.
    pub async fn can_refund(&self, order_id: &OrderId, amount: Option<MoneyAmount>) -> bool {
        let order = match self.orders.get_order(order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "refund check: order lookup failed");
                return false;
            }
        };

        if order.is_checkout() {
            return self
                .remaining(order_id, "refund", |info| info.remaining_reversal_amount)
                .await
                .is_some_and(|remaining| remaining.is_positive());
        }

        let Some(payment_id) = order.payment_id.as_ref() else {
            return false;
        };

        let transactions = match self.gateway.fetch_transactions(payment_id).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "refund check: transaction fetch failed");
                return false;
            }
        };

        let refunded = transactions
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Reversal && !t.is_failed())
            .fold(MoneyAmount::ZERO, |sum, t| {
                sum.checked_add(t.amount).unwrap_or(sum)
            });

        let requested = amount.unwrap_or(order.amount);
        let possible = order.amount.saturating_sub(refunded);
        requested <= possible
    }

    pub async fn capture(
        &self,
        order_id: &OrderId,
        amount: Option<MoneyAmount>,
        vat_amount: Option<MoneyAmount>,
    ) -> Result<ActionResponse, ReconcileError> {
        let order = self.orders.get_order(order_id).await?;
        let (amount, vat_amount) = amounts_or_total(&order, amount, vat_amount);

        if !self.can_capture(order_id).await {
            return Err(ineligible("capture", order_id));
        }

        let request = match order.payment_method {
            // Checkout captures every order line, so the full total.
            PaymentMethod::Checkout => TransactionRequest {
                operation: TransactionOperation::Capture,
                target: TransactionTarget::PaymentOrder(order.require_payment_order_id()?.clone()),
                amount: Some(order.amount),
                vat_amount: Some(order.vat_amount),
                description: format!("Capture for Order #{order_id}"),
                payee_reference: payee_reference(order_id),
            },
            _ => TransactionRequest {
                operation: TransactionOperation::Capture,
                target: TransactionTarget::Payment(order.require_payment_id()?.clone()),
                amount: Some(amount),
                vat_amount: Some(vat_amount),
                description: format!("Capture for Order #{order_id}"),
                payee_reference: payee_reference(order_id),
            },
        };

        self.execute(order_id, &request).await
    }

    pub async fn cancel(
        &self,
        order_id: &OrderId,
        amount: Option<MoneyAmount>,
        vat_amount: Option<MoneyAmount>,
    ) -> Result<ActionResponse, ReconcileError> {
        let order = self.orders.get_order(order_id).await?;

        if !self.can_cancel(order_id).await {
            return Err(ineligible("cancellation", order_id));
        }

        let target = match order.payment_method {
            PaymentMethod::Checkout => {
                let partial_amount = amount.is_some_and(|a| a.is_positive() && a != order.amount);
                let partial_vat =
                    vat_amount.is_some_and(|v| v.is_positive() && v != order.vat_amount);
                if partial_amount || partial_vat {
                    return Err(ReconcileError::Validation(
                        "Partial cancellation isn't available.".into(),
                    ));
                }
                TransactionTarget::PaymentOrder(order.require_payment_order_id()?.clone())
            }
            _ => TransactionTarget::Payment(order.require_payment_id()?.clone()),
        };

        let request = TransactionRequest {
            operation: TransactionOperation::Cancellation,
            target,
            amount: None,
            vat_amount: None,
            description: format!("Cancellation for Order #{order_id}"),
            payee_reference: payee_reference(order_id),
        };

        self.execute(order_id, &request).await
    }

    pub async fn refund(
        &self,
        order_id: &OrderId,
        amount: Option<MoneyAmount>,
        vat_amount: Option<MoneyAmount>,
    ) -> Result<ActionResponse, ReconcileError> {
        let order = self.orders.get_order(order_id).await?;
        let (amount, vat_amount) = amounts_or_total(&order, amount, vat_amount);

        if !self.can_refund(order_id, Some(amount)).await {
            return Err(ineligible("refund", order_id));
        }

        let request = match order.payment_method {
            PaymentMethod::Checkout => TransactionRequest {
                operation: TransactionOperation::Reversal,
                target: TransactionTarget::PaymentOrder(order.require_payment_order_id()?.clone()),
                amount: Some(order.amount),
                vat_amount: Some(order.vat_amount),
                description: format!("Refund for Order #{order_id}."),
                payee_reference: payee_reference(order_id),
            },
            _ => TransactionRequest {
                operation: TransactionOperation::Reversal,
                target: TransactionTarget::Payment(order.require_payment_id()?.clone()),
                amount: Some(amount),
                vat_amount: Some(vat_amount),
                description: format!("Refund for Order #{order_id}."),
                payee_reference: payee_reference(order_id),
            },
        };

        self.execute(order_id, &request).await
    }

    /// Abort a payment that has not been captured yet.
    pub async fn abort(&self, order_id: &OrderId) -> Result<String, ReconcileError> {
        let order = self.orders.get_order(order_id).await?;
        let payment_id = order.require_payment_id()?;

        if order.status.is_paid() {
            return Err(ineligible("abort", order_id));
        }

        let info = self.gateway.fetch_payment_info(payment_id.as_str()).await?;
        let href = info
            .operation_by_rel(ABORT_REL)
            .ok_or_else(|| ReconcileError::AbortFailed("Abort is unavailable".into()))?;

        let state = self.gateway.abort(href).await?;
        if state != "Aborted" {
            return Err(ReconcileError::AbortFailed(format!(
                "Aborting is failed, payment state: {state}"
            )));
        }

        if self
            .orders
            .can_update_order_status(order_id, OrderStatus::Cancelled, None)
            .await?
        {
            self.orders
                .update_order_status(order_id, OrderStatus::Cancelled, Some("Payment aborted"), None)
                .await?;
        }
        tracing::info!(order_id = %order_id, "payment aborted");
        Ok(state)
    }

    /// Re-reads the order and its payment info; nothing is cached between
    /// the check and the action.
    async fn remaining(
        &self,
        order_id: &OrderId,
        action: &'static str,
        pick: impl Fn(&crate::domain::provider::PaymentInfo) -> Option<MoneyAmount>,
    ) -> Option<MoneyAmount> {
        let order = match self.orders.get_order(order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(order_id = %order_id, action, error = %e, "eligibility check: order lookup failed");
                return None;
            }
        };

        let resource = match order.info_resource() {
            Ok(resource) => resource,
            Err(e) => {
                tracing::warn!(order_id = %order_id, action, error = %e, "eligibility check: no payment reference");
                return None;
            }
        };

        match self.gateway.fetch_payment_info(resource).await {
            Ok(info) => pick(&info),
            Err(e) => {
                tracing::warn!(order_id = %order_id, action, error = %e, "eligibility check: payment info fetch failed");
                None
            }
        }
    }

    async fn execute(
        &self,
        order_id: &OrderId,
        request: &TransactionRequest,
    ) -> Result<ActionResponse, ReconcileError> {
        let transaction = match self.gateway.send_transaction(request).await {
            Ok(transaction) => transaction,
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    operation = request.operation.as_str(),
                    error = %e,
                    "provider rejected transaction request"
                );
                return Err(e.into());
            }
        };

        tracing::info!(
            order_id = %order_id,
            operation = request.operation.as_str(),
            transaction_number = transaction.number,
            state = %transaction.state,
            "transaction created"
        );

        let result = self
            .reconciler
            .process_transaction(order_id, &transaction)
            .await?;

        Ok(ActionResponse {
            duplicate: result == ProcessResult::Duplicate,
            transaction,
        })
    }
}

fn ineligible(action: &'static str, order_id: &OrderId) -> ReconcileError {
    ReconcileError::IneligibleAction {
        action,
        order_id: order_id.to_string(),
    }
}

fn amounts_or_total(
    order: &Order,
    amount: Option<MoneyAmount>,
    vat_amount: Option<MoneyAmount>,
) -> (MoneyAmount, MoneyAmount) {
    match amount.filter(|a| a.is_positive()) {
        Some(amount) => (amount, vat_amount.unwrap_or(MoneyAmount::ZERO)),
        None => (order.amount, order.vat_amount),
    }
}

/// `{order_id}{random}`, alphanumeric, at most 30 characters.
fn payee_reference(order_id: &OrderId) -> String {
    let base: String = order_id
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(PAYEE_REFERENCE_MAX_LEN - 8)
        .collect();
    let random = Uuid::now_v7().simple().to_string();
    let suffix = &random[random.len() - 8..];
    format!("{base}{suffix}")
}
