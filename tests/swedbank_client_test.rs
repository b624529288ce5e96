mod common;

use common::*;
use mockito::Matcher;
use std::time::Duration;
use swedbank_reconcile::adapters::swedbank_client::SwedbankClient;
use swedbank_reconcile::config::GatewayConfig;
use swedbank_reconcile::domain::id::{PaymentId, PaymentOrderId};
use swedbank_reconcile::domain::provider::{
    PaymentGatewayClient, TransactionOperation, TransactionRequest, TransactionTarget,
};
use swedbank_reconcile::domain::transaction::{TransactionState, TransactionType};

fn client(server: &mockito::ServerGuard) -> SwedbankClient {
    SwedbankClient::new(&GatewayConfig {
        base_url: server.url(),
        access_token: "test-token".into(),
        request_timeout: Duration::from_secs(5),
        user_agent: Some("WooCommerce/8.0".into()),
    })
    .unwrap()
}

fn payment_id() -> PaymentId {
    PaymentId::new(PAYMENT_ID).unwrap()
}

// ── 1. payment_info_reads_remaining_amounts ────────────────────────────────

#[tokio::test]
async fn payment_info_reads_remaining_amounts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", PAYMENT_ID)
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "payment": {
                    "id": PAYMENT_ID,
                    "state": "Ready",
                    "remainingCaptureAmount": 1500,
                    "remainingCancellationAmount": 1500
                },
                "operations": [
                    { "method": "PATCH", "href": format!("{}{PAYMENT_ID}", server.url()), "rel": "update-payment-abort" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let info = client(&server).fetch_payment_info(PAYMENT_ID).await.unwrap();

    mock.assert_async().await;
    assert_eq!(info.state.as_deref(), Some("Ready"));
    assert_eq!(info.remaining_capture_amount, Some(money(1500)));
    assert_eq!(info.remaining_cancellation_amount, Some(money(1500)));
    assert_eq!(info.remaining_reversal_amount, None, "absent field stays absent");
    assert!(info.operation_by_rel("update-payment-abort").is_some());
}

// ── 2. payment_order_info_is_read_too ──────────────────────────────────────

#[tokio::test]
async fn payment_order_info_is_read_too() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", PAYMENT_ORDER_ID)
        .with_status(200)
        .with_body(
            serde_json::json!({
                "paymentOrder": { "id": PAYMENT_ORDER_ID, "remainingReversalAmount": 500 },
                "operations": []
            })
            .to_string(),
        )
        .create_async()
        .await;

    let info = client(&server)
        .fetch_payment_info(PAYMENT_ORDER_ID)
        .await
        .unwrap();

    assert_eq!(info.remaining_reversal_amount, Some(money(500)));
    assert_eq!(info.remaining_capture_amount, None);
}

// ── 3. current_payment_resolves_payment_id ─────────────────────────────────

#[tokio::test]
async fn current_payment_resolves_payment_id() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", format!("{PAYMENT_ORDER_ID}/currentpayment").as_str())
        .with_status(200)
        .with_body(
            serde_json::json!({
                "paymentOrder": PAYMENT_ORDER_ID,
                "menuElementName": "creditcard",
                "payment": { "id": CHECKOUT_PAYMENT_ID, "number": 1234 }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let resolved = client(&server)
        .payment_id_by_payment_order(&PaymentOrderId::new(PAYMENT_ORDER_ID).unwrap())
        .await
        .unwrap();

    assert_eq!(resolved.map(PaymentId::into_inner).as_deref(), Some(CHECKOUT_PAYMENT_ID));
}

// ── 4. transactions_list_is_parsed ─────────────────────────────────────────

#[tokio::test]
async fn transactions_list_is_parsed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", format!("{PAYMENT_ID}/transactions").as_str())
        .with_status(200)
        .with_body(
            serde_json::json!({
                "payment": PAYMENT_ID,
                "transactions": {
                    "id": format!("{PAYMENT_ID}/transactions"),
                    "transactionList": [
                        {
                            "id": format!("{PAYMENT_ID}/transactions/1"),
                            "type": "Authorization",
                            "state": "Completed",
                            "number": 40108027688u64,
                            "amount": 28125,
                            "vatAmount": 5625,
                            "description": "Authorization",
                            "payeeReference": "33787xljqrs"
                        },
                        {
                            "id": format!("{PAYMENT_ID}/transactions/2"),
                            "type": "Capture",
                            "state": "Failed",
                            "number": 40108027689u64,
                            "amount": 28125,
                            "vatAmount": 5625,
                            "description": "Capture",
                            "problem": {
                                "type": "https://api.payex.com/psp/errordetail/creditcard/acquirererror",
                                "title": "Operation failed",
                                "status": 403,
                                "detail": "Unable to complete Capture transaction",
                                "problems": [
                                    { "name": "CommunicationError", "description": "Unexpected communication behavior" }
                                ]
                            }
                        }
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let transactions = client(&server).fetch_transactions(&payment_id()).await.unwrap();

    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].transaction_type, TransactionType::Authorization);
    assert_eq!(transactions[1].state, TransactionState::Failed);
    assert_eq!(
        transactions[1].failed_details(),
        "(CommunicationError) Unexpected communication behavior"
    );
}

// ── 5. verifications_carry_tokens ──────────────────────────────────────────

#[tokio::test]
async fn verifications_carry_tokens() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", format!("{PAYMENT_ID}/verifications").as_str())
        .with_status(200)
        .with_body(
            serde_json::json!({
                "verifications": {
                    "verificationList": [{
                        "paymentToken": "5a17c24e-d459-4567-bbad-aa0f17a76119",
                        "recurrenceToken": "e8c5b1de-f4a5-4fe5-a5ee-ac3c2d7f2e44",
                        "cardBrand": "Visa",
                        "maskedPan": "492500******0004",
                        "expiryDate": "12/2030",
                        "transaction": {
                            "id": format!("{PAYMENT_ID}/transactions/3"),
                            "type": "Verification",
                            "state": "Completed",
                            "number": 3,
                            "amount": 0,
                            "vatAmount": 0
                        }
                    }]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let list = client(&server).fetch_verifications(&payment_id()).await.unwrap();

    assert_eq!(list.len(), 1);
    assert!(list[0].has_token());
    assert_eq!(list[0].card_brand.as_deref(), Some("Visa"));
}

// ── 6. capture_request_body_and_response ───────────────────────────────────

#[tokio::test]
async fn capture_request_body_and_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("{PAYMENT_ID}/captures").as_str())
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "transaction": {
                "amount": 28125,
                "vatAmount": 5625,
                "description": "Capture for Order #1",
                "payeeReference": "1a2b3c4d"
            }
        })))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "payment": PAYMENT_ID,
                "capture": {
                    "id": format!("{PAYMENT_ID}/captures/1"),
                    "transaction": {
                        "id": format!("{PAYMENT_ID}/transactions/4"),
                        "type": "Capture",
                        "state": "Completed",
                        "number": 40108027689u64,
                        "amount": 28125,
                        "vatAmount": 5625,
                        "description": "Capture for Order #1",
                        "payeeReference": "1a2b3c4d"
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = TransactionRequest {
        operation: TransactionOperation::Capture,
        target: TransactionTarget::Payment(payment_id()),
        amount: Some(money(28125)),
        vat_amount: Some(money(5625)),
        description: "Capture for Order #1".into(),
        payee_reference: "1a2b3c4d".into(),
    };
    let tx = client(&server).send_transaction(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(tx.number, 40108027689);
    assert_eq!(tx.transaction_type, TransactionType::Capture);
}

// ── 7. error_response_becomes_problem ──────────────────────────────────────

#[tokio::test]
async fn error_response_becomes_problem() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", format!("{PAYMENT_ID}/reversals").as_str())
        .with_status(400)
        .with_header("content-type", "application/problem+json")
        .with_body(
            serde_json::json!({
                "type": "https://api.payex.com/psp/errordetail/inputerror",
                "title": "Error in input data",
                "status": 400,
                "detail": "Input validation failed",
                "problems": [
                    { "name": "Transaction.Amount", "description": "Amount exceeds remaining" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = TransactionRequest {
        operation: TransactionOperation::Reversal,
        target: TransactionTarget::Payment(payment_id()),
        amount: Some(money(100)),
        vat_amount: Some(money(20)),
        description: "Refund for Order #1.".into(),
        payee_reference: "1ref".into(),
    };
    let err = client(&server).send_transaction(&request).await.unwrap_err();

    assert_eq!(err.status, Some(400));
    assert!(err.problem.is_some());
    assert_eq!(
        err.formatted_message(),
        "Input validation failed\nTransaction.Amount: Amount exceeds remaining"
    );
}

// ── 8. abort_patches_operation_href ────────────────────────────────────────

#[tokio::test]
async fn abort_patches_operation_href() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", PAYMENT_ID)
        .match_body(Matcher::PartialJson(serde_json::json!({
            "payment": { "operation": "Abort", "abortReason": "CancelledByConsumer" }
        })))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "payment": { "id": PAYMENT_ID, "state": "Aborted" },
                "operations": []
            })
            .to_string(),
        )
        .create_async()
        .await;

    let href = format!("{}{PAYMENT_ID}", server.url());
    let state = client(&server).abort(&href).await.unwrap();

    mock.assert_async().await;
    assert_eq!(state, "Aborted");
}

// ── 9. unparseable_error_keeps_status ──────────────────────────────────────

#[tokio::test]
async fn unparseable_error_keeps_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", PAYMENT_ID)
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let err = client(&server).fetch_payment_info(PAYMENT_ID).await.unwrap_err();

    assert_eq!(err.status, Some(502));
    assert!(err.problem.is_none());
    assert!(err.message.contains("502"));
}
