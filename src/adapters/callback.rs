use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::ReconcileError, id::OrderId},
        infra::postgres::job_repo,
    },
    axum::{
        Json,
        extract::{Query, State},
    },
    serde::Deserialize,
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload {
    #[serde(default)]
    payment: Option<ResourceRef>,
    #[serde(default)]
    payment_order: Option<ResourceRef>,
    #[serde(default)]
    transaction: Option<TransactionRef>,
}

#[derive(Debug, Deserialize)]
struct ResourceRef {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionRef {
    #[serde(default)]
    number: Option<u64>,
}

/// Validated callback: which order, which transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTarget {
    pub order_id: OrderId,
    pub transaction_number: u64,
}

/// Check a callback body against the order it was addressed to.
pub fn parse_callback(
    order_id: &str,
    payload: &serde_json::Value,
) -> Result<CallbackTarget, ReconcileError> {
    let order_id = OrderId::new(order_id)?;
    let parsed: CallbackPayload = serde_json::from_value(payload.clone())
        .map_err(|e| ReconcileError::Validation(format!("invalid callback body: {e}")))?;

    let has_resource = [&parsed.payment, &parsed.payment_order]
        .into_iter()
        .flatten()
        .any(|r| r.id.as_deref().is_some_and(|id| !id.is_empty()));
    if !has_resource {
        return Err(ReconcileError::Validation(
            "callback has no payment or paymentOrder id".into(),
        ));
    }

    let transaction_number = parsed
        .transaction
        .and_then(|t| t.number)
        .filter(|n| *n > 0)
        .ok_or_else(|| ReconcileError::Validation("callback has no transaction number".into()))?;

    Ok(CallbackTarget {
        order_id,
        transaction_number,
    })
}

/// Swedbank Pay callback: validate, enqueue, acknowledge.
#[tracing::instrument(
    name = "swedbank_callback",
    skip_all,
    fields(order_id = %query.order_id, transaction_number = tracing::field::Empty)
)]
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let target = parse_callback(&query.order_id, &payload)?;
    tracing::Span::current().record("transaction_number", target.transaction_number);

    let number = i64::try_from(target.transaction_number).map_err(|_| {
        ReconcileError::Validation("transaction number out of range".into())
    })?;

    let inserted =
        job_repo::enqueue(&state.pool, target.order_id.as_str(), number, &payload).await?;

    let status = if inserted {
        tracing::info!("callback enqueued");
        "accepted"
    } else {
        tracing::info!("duplicate callback, already enqueued");
        "duplicate"
    };

    Ok(Json(serde_json::json!({ "status": status })))
}
