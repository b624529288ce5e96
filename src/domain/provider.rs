use {
    super::error::ReconcileError,
    super::id::{PaymentId, PaymentOrderId},
    super::money::MoneyAmount,
    super::problem::Problem,
    super::transaction::Transaction,
    serde::{Deserialize, Serialize},
    std::{future::Future, pin::Pin},
    thiserror::Error,
};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Error returned by the payment provider or the transport in front of it.
#[derive(Debug, Clone, Error)]
#[error("provider request failed: {message}")]
pub struct ProviderError {
    pub status: Option<u16>,
    pub problem: Option<Problem>,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            problem: None,
            message: message.into(),
        }
    }

    pub fn from_problem(status: u16, problem: Problem) -> Self {
        Self {
            status: Some(status),
            message: problem.error_message(),
            problem: Some(problem),
        }
    }

    /// Message for the merchant: the formatted problem when the provider sent
    /// one, the raw message otherwise.
    pub fn formatted_message(&self) -> String {
        match &self.problem {
            Some(problem) => problem.error_message(),
            None => self.message.clone(),
        }
    }
}

impl From<ProviderError> for ReconcileError {
    fn from(err: ProviderError) -> Self {
        ReconcileError::ProviderRequestFailed(err.formatted_message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub rel: String,
    pub href: String,
    #[serde(default)]
    pub method: Option<String>,
}

/// The fields of a payment / payment order we reconcile against.
///
/// A missing `remaining_*` amount means the provider considers the action
/// fully applied, which is not the same as a zero amount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentInfo {
    pub state: Option<String>,
    pub remaining_capture_amount: Option<MoneyAmount>,
    pub remaining_cancellation_amount: Option<MoneyAmount>,
    pub remaining_reversal_amount: Option<MoneyAmount>,
    pub operations: Vec<Operation>,
}

impl PaymentInfo {
    pub fn operation_by_rel(&self, rel: &str) -> Option<&str> {
        self.operations
            .iter()
            .find(|op| op.rel == rel)
            .map(|op| op.href.as_str())
    }
}

/// Verification or authorization entry that may carry a reusable token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSource {
    #[serde(default)]
    pub payment_token: Option<String>,
    #[serde(default)]
    pub recurrence_token: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub masked_pan: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    pub transaction: Transaction,
}

impl TokenSource {
    pub fn has_token(&self) -> bool {
        let present = |t: &Option<String>| t.as_deref().is_some_and(|t| !t.is_empty());
        present(&self.payment_token) || present(&self.recurrence_token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOperation {
    Capture,
    Cancellation,
    Reversal,
}

impl TransactionOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Cancellation => "cancellation",
            Self::Reversal => "reversal",
        }
    }
}

/// Where a transaction request is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionTarget {
    PaymentOrder(PaymentOrderId),
    Payment(PaymentId),
}

impl TransactionTarget {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PaymentOrder(id) => id.as_str(),
            Self::Payment(id) => id.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub operation: TransactionOperation,
    pub target: TransactionTarget,
    /// `None` for cancellations, which carry no amount.
    pub amount: Option<MoneyAmount>,
    pub vat_amount: Option<MoneyAmount>,
    pub description: String,
    pub payee_reference: String,
}

pub trait PaymentGatewayClient: Send + Sync {
    /// Fetch a payment or payment order by resource path.
    fn fetch_payment_info<'a>(&'a self, resource: &'a str) -> ProviderFuture<'a, PaymentInfo>;

    /// Resolve the current payment of a payment order, if it has one.
    fn payment_id_by_payment_order<'a>(
        &'a self,
        payment_order_id: &'a PaymentOrderId,
    ) -> ProviderFuture<'a, Option<PaymentId>>;

    fn fetch_transactions<'a>(&'a self, payment_id: &'a PaymentId) -> ProviderFuture<'a, Vec<Transaction>>;

    fn fetch_verifications<'a>(&'a self, payment_id: &'a PaymentId) -> ProviderFuture<'a, Vec<TokenSource>>;

    fn fetch_authorizations<'a>(&'a self, payment_id: &'a PaymentId) -> ProviderFuture<'a, Vec<TokenSource>>;

    /// Create a capture, cancellation or reversal and return its transaction.
    fn send_transaction<'a>(&'a self, request: &'a TransactionRequest) -> ProviderFuture<'a, Transaction>;

    /// Follow an abort operation link; returns the resulting payment state.
    fn abort<'a>(&'a self, href: &'a str) -> ProviderFuture<'a, String>;
}
