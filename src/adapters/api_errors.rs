use {
    crate::domain::error::ReconcileError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// HTTP face of [`ReconcileError`], plus the admin auth failure.
#[derive(Debug)]
pub enum ApiError {
    Domain(ReconcileError),
    Unauthorized,
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        Self::Domain(err)
    }
}

fn internal(kind: &str, err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!("{kind} error: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Unauthorized => {
                let body = serde_json::json!({
                    "error_code": "unauthorized",
                    "message": "missing or invalid bearer token",
                });
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            Self::Domain(err) => err,
        };

        let (status, error_code, message) = match &err {
            ReconcileError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            ReconcileError::UnknownTransactionType(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unknown_transaction_type",
                err.to_string(),
            ),
            ReconcileError::IneligibleAction { .. } => {
                (StatusCode::CONFLICT, "action_not_available", err.to_string())
            }
            ReconcileError::MissingCorrelationId { .. } => (
                StatusCode::CONFLICT,
                "missing_correlation_id",
                err.to_string(),
            ),
            ReconcileError::AbortFailed(msg) => (StatusCode::CONFLICT, "abort_failed", msg.clone()),
            // Already formatted for the merchant.
            ReconcileError::ProviderRequestFailed(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_error", msg.clone())
            }
            ReconcileError::TransactionNotFound(_) => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                err.to_string(),
            ),
            ReconcileError::OrderNotFound(_) => {
                (StatusCode::NOT_FOUND, "order_not_found", err.to_string())
            }
            ReconcileError::OrderStore(msg) => internal("order store", msg),
            ReconcileError::Configuration(msg) => internal("configuration", msg),
            ReconcileError::Database(e) => internal("database", e),
            ReconcileError::Serialization(e) => internal("serialization", e),
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
