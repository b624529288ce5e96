use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("{action} is not available for order {order_id}")]
    IneligibleAction {
        action: &'static str,
        order_id: String,
    },

    #[error("order {order_id} has no {field}")]
    MissingCorrelationId {
        order_id: String,
        field: &'static str,
    },

    #[error("{0}")]
    ProviderRequestFailed(String),

    #[error("failed to fetch transaction number #{0}")]
    TransactionNotFound(u64),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("abort: {0}")]
    AbortFailed(String),

    #[error("order store: {0}")]
    OrderStore(String),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Errors that will not go away by retrying the same work item.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnknownTransactionType(_)
                | Self::MissingCorrelationId { .. }
                | Self::OrderNotFound(_)
        )
    }
}
