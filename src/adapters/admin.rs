use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::ReconcileError, id::OrderId, money::MoneyAmount},
        services::order_actions::ActionResponse,
    },
    axum::{
        Json,
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, header::AUTHORIZATION},
    },
    serde::Deserialize,
    subtle::ConstantTimeEq,
};

/// Optional amounts for capture / cancel / refund, in minor units.
#[derive(Debug, Default, Deserialize)]
pub struct AmountBody {
    #[serde(default)]
    pub amount: Option<MoneyAmount>,
    #[serde(default)]
    pub vat_amount: Option<MoneyAmount>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token.as_bytes().ct_eq(state.admin_token.as_bytes()).unwrap_u8() == 1 => {
            Ok(())
        }
        _ => Err(ApiError::Unauthorized),
    }
}

fn parse_amounts(body: &Bytes) -> Result<AmountBody, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AmountBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ReconcileError::Validation(format!("invalid request body: {e}")).into())
}

fn order_id(raw: &str) -> Result<OrderId, ApiError> {
    Ok(OrderId::new(raw)?)
}

pub async fn capture_handler(
    State(state): State<AppState>,
    Path(raw_order_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ActionResponse>, ApiError> {
    authorize(&state, &headers)?;
    let order_id = order_id(&raw_order_id)?;
    let amounts = parse_amounts(&body)?;
    let response = state
        .actions
        .capture(&order_id, amounts.amount, amounts.vat_amount)
        .await?;
    Ok(Json(response))
}

pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(raw_order_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ActionResponse>, ApiError> {
    authorize(&state, &headers)?;
    let order_id = order_id(&raw_order_id)?;
    let amounts = parse_amounts(&body)?;
    let response = state
        .actions
        .cancel(&order_id, amounts.amount, amounts.vat_amount)
        .await?;
    Ok(Json(response))
}

pub async fn refund_handler(
    State(state): State<AppState>,
    Path(raw_order_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ActionResponse>, ApiError> {
    authorize(&state, &headers)?;
    let order_id = order_id(&raw_order_id)?;
    let amounts = parse_amounts(&body)?;
    let response = state
        .actions
        .refund(&order_id, amounts.amount, amounts.vat_amount)
        .await?;
    Ok(Json(response))
}

pub async fn abort_handler(
    State(state): State<AppState>,
    Path(raw_order_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let order_id = order_id(&raw_order_id)?;
    let payment_state = state.actions.abort(&order_id).await?;
    Ok(Json(serde_json::json!({ "state": payment_state })))
}
