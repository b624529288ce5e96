use {
    crate::domain::error::ReconcileError,
    crate::domain::order::{Order, OrderStatus},
    crate::domain::projection::{
        self, TransactionAction, captured_note, partially_captured_note, partially_refunded_note,
        refunded_note,
    },
    crate::domain::provider::PaymentGatewayClient,
    crate::domain::store::{OrderStore, PaymentTokenRecord},
    crate::domain::transaction::Transaction,
    std::sync::Arc,
};

/// Observable result of projecting one transaction onto its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    NoOp,
    /// Only a note was added.
    Noted,
    TokenSaved,
    StatusUpdated(OrderStatus),
    /// The store refused the update for this transaction number.
    StatusSkipped(OrderStatus),
    /// The lifecycle does not allow the move; recorded as a note instead.
    Anomaly {
        current: OrderStatus,
        requested: OrderStatus,
    },
}

#[derive(Debug, Clone, Copy)]
enum TokenList {
    Verifications,
    Authorizations,
}

/// Maps provider transactions to order status transitions and side effects.
pub struct OrderStatusProjector {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGatewayClient>,
}

impl OrderStatusProjector {
    pub fn new(orders: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGatewayClient>) -> Self {
        Self { orders, gateway }
    }

    pub async fn apply(&self, order: &Order, tx: &Transaction) -> Result<Projection, ReconcileError> {
        let action = projection::decide(tx, order.status)?;

        tracing::debug!(
            order_id = %order.order_id,
            transaction_number = tx.number,
            transaction_type = %tx.transaction_type,
            state = %tx.state,
            ?action,
            "projecting transaction"
        );

        match action {
            TransactionAction::Nothing => Ok(Projection::NoOp),
            TransactionAction::Note(message) => {
                self.note(order, &message).await;
                Ok(Projection::Noted)
            }
            TransactionAction::UpdateStatus {
                status,
                note,
                transaction_number,
            } => {
                self.update_status(order, status, &note, transaction_number)
                    .await
            }
            TransactionAction::SaveVerificationToken => {
                if self.save_first_token(order, TokenList::Verifications).await {
                    Ok(Projection::TokenSaved)
                } else {
                    Ok(Projection::NoOp)
                }
            }
            TransactionAction::Authorize {
                update_status,
                note,
            } => {
                let result = if update_status {
                    self.update_status(order, OrderStatus::Authorized, &note, Some(tx.number))
                        .await?
                } else {
                    self.note(order, &note).await;
                    Projection::Noted
                };

                if order.needs_save_token {
                    self.save_first_token(order, TokenList::Authorizations)
                        .await;
                }

                Ok(result)
            }
            TransactionAction::SettleCapture => {
                let info = self
                    .gateway
                    .fetch_payment_info(order.info_resource()?)
                    .await?;

                // The provider drops `remainingCaptureAmount` once nothing is left.
                if info.remaining_capture_amount.is_none() {
                    self.update_status(
                        order,
                        OrderStatus::Captured,
                        &captured_note(tx),
                        Some(tx.number),
                    )
                    .await
                } else {
                    self.note(order, &partially_captured_note(tx)).await;
                    Ok(Projection::Noted)
                }
            }
            TransactionAction::SettleReversal => {
                let info = self
                    .gateway
                    .fetch_payment_info(order.info_resource()?)
                    .await?;

                self.create_credit_memo(order, tx).await;

                if info.remaining_reversal_amount.is_none() {
                    self.update_status(
                        order,
                        OrderStatus::Refunded,
                        &refunded_note(tx),
                        Some(tx.number),
                    )
                    .await
                } else {
                    self.note(order, &partially_refunded_note(tx)).await;
                    Ok(Projection::Noted)
                }
            }
        }
    }

    async fn update_status(
        &self,
        order: &Order,
        status: OrderStatus,
        note: &str,
        transaction_number: Option<u64>,
    ) -> Result<Projection, ReconcileError> {
        if !order.status.can_transition_to(&status) {
            tracing::warn!(
                order_id = %order.order_id,
                from = %order.status,
                to = %status,
                "invalid status transition, logged as anomaly"
            );
            self.note(order, note).await;
            return Ok(Projection::Anomaly {
                current: order.status,
                requested: status,
            });
        }

        let allowed = self
            .orders
            .can_update_order_status(&order.order_id, status, transaction_number)
            .await?;
        if !allowed {
            tracing::warn!(
                order_id = %order.order_id,
                status = %status,
                transaction_number,
                "order status update skipped, transaction already used"
            );
            return Ok(Projection::StatusSkipped(status));
        }

        self.orders
            .update_order_status(&order.order_id, status, Some(note), transaction_number)
            .await?;
        tracing::info!(order_id = %order.order_id, from = %order.status, to = %status, "order status updated");
        Ok(Projection::StatusUpdated(status))
    }

    async fn note(&self, order: &Order, message: &str) {
        if let Err(e) = self.orders.add_order_note(&order.order_id, message).await {
            tracing::warn!(order_id = %order.order_id, error = %e, "failed to add order note");
        }
    }

    /// Save the first usable token from the list. Never fails the projection.
    async fn save_first_token(&self, order: &Order, list: TokenList) -> bool {
        let Some(customer_id) = order.customer_id.as_deref() else {
            tracing::debug!(order_id = %order.order_id, "no customer on order, token not saved");
            return false;
        };

        let payment_id = match order.require_payment_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "cannot look up tokens");
                return false;
            }
        };

        let sources = match list {
            TokenList::Verifications => self.gateway.fetch_verifications(payment_id).await,
            TokenList::Authorizations => self.gateway.fetch_authorizations(payment_id).await,
        };
        let sources = match sources {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(order_id = %order.order_id, ?list, error = %e, "failed to fetch token list");
                return false;
            }
        };

        let Some(source) = sources
            .into_iter()
            .find(|s| !s.transaction.is_failed() && s.has_token())
        else {
            return false;
        };

        let record = PaymentTokenRecord {
            customer_id: customer_id.to_string(),
            payment_token: source.payment_token,
            recurrence_token: source.recurrence_token,
            card_brand: source.card_brand,
            masked_pan: source.masked_pan,
            expiry_date: source.expiry_date,
            order_id: Some(order.order_id.clone()),
        };

        match self.orders.save_payment_token(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "failed to save payment token");
                false
            }
        }
    }

    /// Credit memo for a completed reversal, at most one per provider
    /// transaction. Failures end up as an order note.
    async fn create_credit_memo(&self, order: &Order, tx: &Transaction) {
        let transaction_id = tx.number.to_string();

        match self.orders.is_credit_memo_exist(&transaction_id).await {
            Ok(true) => {
                tracing::info!(order_id = %order.order_id, transaction_number = tx.number, "credit memo already exists");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.note(order, &format!("Unable to create credit memo. {e}"))
                    .await;
                return;
            }
        }

        if let Err(e) = self
            .orders
            .create_credit_memo(&order.order_id, tx.amount, &transaction_id, &tx.description)
            .await
        {
            tracing::warn!(order_id = %order.order_id, transaction_number = tx.number, error = %e, "credit memo creation failed");
            self.note(order, &format!("Unable to create credit memo. {e}"))
                .await;
        }
    }
}
