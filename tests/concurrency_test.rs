mod common;

use common::*;
use std::time::Duration;
use swedbank_reconcile::domain::order::OrderStatus;
use swedbank_reconcile::domain::transaction::{TransactionState, TransactionType};
use swedbank_reconcile::services::projector::Projection;
use swedbank_reconcile::services::reconciler::ProcessResult;

// ── 1. concurrent_duplicate_deliveries ─────────────────────────────────────
// 10 tasks deliver the same transaction. Exactly 1 applies it, the rest are duplicates.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_deliveries() {
    let h = Harness::new(make_order("4001", OrderStatus::Captured, 10000));
    h.gateway.set_info(PAYMENT_ID, info(None, None, None));
    let tx = make_tx(TransactionType::Reversal, TransactionState::Completed, 4001, 10000);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let reconciler = h.reconciler.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            reconciler
                .process_transaction(&order_id("4001"), &tx)
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ProcessResult::Applied(_) => applied += 1,
            ProcessResult::Duplicate => duplicates += 1,
        }
    }

    assert_eq!(applied, 1, "exactly 1 Applied");
    assert_eq!(duplicates, 9, "9 Duplicates");
    assert_eq!(h.orders.memos().len(), 1, "one credit memo");
    assert_eq!(h.orders.updates().len(), 1, "one status update");
    assert_eq!(h.orders.status(&order_id("4001")), OrderStatus::Refunded);
}

// ── 2. concurrent_distinct_transactions_all_apply ──────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_transactions_all_apply() {
    let h = Harness::new(make_order("4002", OrderStatus::Authorized, 10000));

    let mut handles = Vec::new();
    for number in 1..=8u64 {
        let reconciler = h.reconciler.clone();
        handles.push(tokio::spawn(async move {
            let tx = make_tx(TransactionType::Capture, TransactionState::Pending, number, 1000);
            reconciler
                .process_transaction(&order_id("4002"), &tx)
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert!(matches!(handle.await.unwrap(), ProcessResult::Applied(_)));
    }

    assert_eq!(h.ledger.observation_count(&order_id("4002")).await, 8);
    assert_eq!(h.orders.notes_for(&order_id("4002")).len(), 8);
}

// ── 3. concurrent_polls_and_callbacks ──────────────────────────────────────
// A poll over the whole list races callbacks for single numbers; every
// transaction is still applied once.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_polls_and_callbacks() {
    let h = Harness::new(make_order("4003", OrderStatus::Pending, 10000));
    h.gateway.set_info(PAYMENT_ID, info(None, None, None));
    h.gateway.set_transactions(vec![
        make_tx(TransactionType::Authorization, TransactionState::Completed, 31, 10000),
        make_tx(TransactionType::Authorization, TransactionState::Pending, 32, 10000),
    ]);

    let mut handles = Vec::new();
    for i in 0..6 {
        let reconciler = h.reconciler.clone();
        handles.push(tokio::spawn(async move {
            let number = match i % 3 {
                0 => None,
                1 => Some(31),
                _ => Some(32),
            };
            reconciler
                .fetch_transactions_and_update_order(&order_id("4003"), number)
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        applied += handle.await.unwrap().applied;
    }

    assert_eq!(applied, 2, "each transaction applied once across all tasks");
    assert_eq!(h.orders.updates().len(), 1);
    assert_eq!(h.orders.status(&order_id("4003")), OrderStatus::Authorized);
}

// ── 4. stale_snapshot_cannot_regress_capture ───────────────────────────────
// An authorization reads the order, then stalls. A capture for another
// number arrives meanwhile. The capture must wait for the order and win.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_snapshot_cannot_regress_capture() {
    let h = Harness::new(make_order("4004", OrderStatus::Authorized, 10000));
    h.gateway.set_info(PAYMENT_ID, info(None, Some(0), Some(10000)));
    h.orders
        .read_delays
        .lock()
        .unwrap()
        .push_back(Duration::from_millis(200));

    let slow = {
        let reconciler = h.reconciler.clone();
        tokio::spawn(async move {
            let tx = make_tx(TransactionType::Authorization, TransactionState::Completed, 41, 10000);
            reconciler
                .process_transaction(&order_id("4004"), &tx)
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast = {
        let reconciler = h.reconciler.clone();
        tokio::spawn(async move {
            let tx = make_tx(TransactionType::Capture, TransactionState::Completed, 42, 10000);
            reconciler
                .process_transaction(&order_id("4004"), &tx)
                .await
                .unwrap()
        })
    };

    assert!(matches!(slow.await.unwrap(), ProcessResult::Applied(_)));
    assert_eq!(
        fast.await.unwrap(),
        ProcessResult::Applied(Projection::StatusUpdated(OrderStatus::Captured))
    );
    assert_eq!(h.orders.status(&order_id("4004")), OrderStatus::Captured);
    assert_eq!(h.ledger.observation_count(&order_id("4004")).await, 2);
}
