use {
    super::error::ReconcileError,
    super::order::OrderStatus,
    super::transaction::{Transaction, TransactionState, TransactionType},
};

/// What one transaction asks of its order, before any remote lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAction {
    Nothing,
    Note(String),
    UpdateStatus {
        status: OrderStatus,
        note: String,
        /// Set when the update should consume the transaction number.
        transaction_number: Option<u64>,
    },
    /// Completed verification: look for a token to save.
    SaveVerificationToken,
    /// Completed authorization. `update_status` is false when the order was
    /// already captured and must not regress.
    Authorize { update_status: bool, note: String },
    /// Completed capture: full or partial depends on the payment info.
    SettleCapture,
    /// Completed reversal: credit memo, then full or partial refund.
    SettleReversal,
}

pub fn decide(tx: &Transaction, current: OrderStatus) -> Result<TransactionAction, ReconcileError> {
    use TransactionAction::*;
    use TransactionState::*;

    let number = tx.number;
    let amount = tx.amount;

    let action = match (&tx.transaction_type, tx.state) {
        (TransactionType::Verification, Failed) => Note(format!(
            "Verification has been failed. Transaction: {number}. Reason: {}.",
            tx.failed_details()
        )),
        (TransactionType::Verification, Pending) => Note(format!(
            "Verification transaction is pending. Transaction: {number}"
        )),
        (TransactionType::Verification, Initialized | AwaitingActivity) => Nothing,
        (TransactionType::Verification, Completed) => SaveVerificationToken,

        (TransactionType::Authorization, Failed) => failed("Authorization", tx),
        (TransactionType::Authorization, Pending) => Note(format!(
            "Authorization is pending. Amount: {amount}. Transaction: {number}"
        )),
        (TransactionType::Authorization, Initialized | AwaitingActivity) => UpdateStatus {
            status: OrderStatus::Authorized,
            note: format!(
                "Authorization is {}. Amount: {amount}. Transaction: {number}",
                tx.state
            ),
            transaction_number: None,
        },
        (TransactionType::Authorization, Completed) => Authorize {
            update_status: current != OrderStatus::Captured,
            note: format!("Payment has been authorized. Transaction: {number}"),
        },

        (TransactionType::Capture | TransactionType::Sale, Failed) => failed("Capture", tx),
        (TransactionType::Capture | TransactionType::Sale, Pending) => Note(format!(
            "Capture is pending. Amount: {amount}. Transaction: {number}"
        )),
        (TransactionType::Capture | TransactionType::Sale, Initialized | AwaitingActivity) => {
            Note(format!(
                "Capture is {}. Amount: {amount}. Transaction: {number}",
                tx.state
            ))
        }
        (TransactionType::Capture | TransactionType::Sale, Completed) => SettleCapture,

        (TransactionType::Cancellation, Failed) => failed("Cancellation", tx),
        (TransactionType::Cancellation, Pending) => UpdateStatus {
            status: OrderStatus::Cancelled,
            note: format!("Cancellation is pending. Transaction: {number}"),
            transaction_number: Some(number),
        },
        (TransactionType::Cancellation, Initialized | AwaitingActivity) => UpdateStatus {
            status: OrderStatus::Cancelled,
            note: format!("Cancellation is {}. Transaction ID: {number}", tx.state),
            transaction_number: None,
        },
        (TransactionType::Cancellation, Completed) => UpdateStatus {
            status: OrderStatus::Cancelled,
            note: format!("Payment has been cancelled. Transaction: {number}"),
            transaction_number: Some(number),
        },

        (TransactionType::Reversal, Failed) => failed("Reversal", tx),
        (TransactionType::Reversal, Pending) => UpdateStatus {
            status: OrderStatus::Refunded,
            note: format!("Reversal is pending. Amount: {amount}, Transaction: {number}"),
            transaction_number: Some(number),
        },
        (TransactionType::Reversal, Initialized | AwaitingActivity) => Note(format!(
            "Reversal is {}. Amount: {amount}. Transaction ID: {number}",
            tx.state
        )),
        (TransactionType::Reversal, Completed) => SettleReversal,

        (TransactionType::Other(other), _) => {
            return Err(ReconcileError::UnknownTransactionType(other.clone()));
        }
    };

    Ok(action)
}

fn failed(kind: &str, tx: &Transaction) -> TransactionAction {
    TransactionAction::UpdateStatus {
        status: OrderStatus::Failed,
        note: format!(
            "{kind} has been failed. Transaction: {}. Reason: {}.",
            tx.number,
            tx.failed_details()
        ),
        transaction_number: Some(tx.number),
    }
}

pub fn captured_note(tx: &Transaction) -> String {
    format!(
        "Payment has been captured. Transaction: {}. Amount: {}",
        tx.number, tx.amount
    )
}

pub fn partially_captured_note(tx: &Transaction) -> String {
    format!(
        "Payment has been partially captured: Transaction: {}. Amount: {}",
        tx.number, tx.amount
    )
}

pub fn refunded_note(tx: &Transaction) -> String {
    format!(
        "Payment has been refunded. Transaction: {}. Amount: {}",
        tx.number, tx.amount
    )
}

pub fn partially_refunded_note(tx: &Transaction) -> String {
    format!(
        "Payment has been partially refunded: Transaction: {}. Amount: {}",
        tx.number, tx.amount
    )
}
