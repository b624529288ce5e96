use {
    super::error::ReconcileError,
    super::id::{OrderId, PaymentId},
    super::money::MoneyAmount,
    super::order::{Order, OrderStatus},
    std::{future::Future, pin::Pin},
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ReconcileError>> + Send + 'a>>;

/// Reusable card token to keep for the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTokenRecord {
    pub customer_id: String,
    pub payment_token: Option<String>,
    pub recurrence_token: Option<String>,
    pub card_brand: Option<String>,
    pub masked_pan: Option<String>,
    pub expiry_date: Option<String>,
    pub order_id: Option<OrderId>,
}

/// The shop's order storage, which owns orders, notes, tokens and memos.
pub trait OrderStore: Send + Sync {
    fn get_order<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, Order>;

    /// Move the order to `status`. A `transaction_number` that was already
    /// used for a status update on this order makes the call a no-op.
    fn update_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        status: OrderStatus,
        note: Option<&'a str>,
        transaction_number: Option<u64>,
    ) -> StoreFuture<'a, ()>;

    fn can_update_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        status: OrderStatus,
        transaction_number: Option<u64>,
    ) -> StoreFuture<'a, bool>;

    fn add_order_note<'a>(&'a self, order_id: &'a OrderId, message: &'a str) -> StoreFuture<'a, ()>;

    fn set_payment_id<'a>(&'a self, order_id: &'a OrderId, payment_id: &'a PaymentId) -> StoreFuture<'a, ()>;

    fn save_payment_token<'a>(&'a self, token: &'a PaymentTokenRecord) -> StoreFuture<'a, ()>;

    /// Fails when `transaction_id` is empty or the store refuses the memo.
    fn create_credit_memo<'a>(
        &'a self,
        order_id: &'a OrderId,
        amount: MoneyAmount,
        transaction_id: &'a str,
        description: &'a str,
    ) -> StoreFuture<'a, ()>;

    fn is_credit_memo_exist<'a>(&'a self, transaction_id: &'a str) -> StoreFuture<'a, bool>;
}
