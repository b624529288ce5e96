use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    swedbank_reconcile::{
        AppState,
        adapters::{admin, callback, swedbank_client::SwedbankClient},
        config::AppConfig,
        domain::{ledger::TransactionStore, provider::PaymentGatewayClient, store::OrderStore},
        infra::postgres::{order_repo::PgOrderStore, transaction_repo::PgTransactionStore},
        services::{order_actions::OrderActionService, reconciler::Reconciler, worker},
    },
    tokio::{signal, sync::watch},
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let gateway: Arc<dyn PaymentGatewayClient> =
        Arc::new(SwedbankClient::new(&config.gateway).expect("failed to build provider client"));
    let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool.clone()));
    let ledger: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(pool.clone()));

    let reconciler = Arc::new(Reconciler::new(ledger, orders.clone(), gateway.clone()));
    let actions = Arc::new(OrderActionService::new(orders, gateway, reconciler.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker::run_worker(
        pool.clone(),
        reconciler,
        config.worker_batch_size,
        config.failure_retry,
        shutdown_rx.clone(),
    ));
    let reaper_handle = tokio::spawn(worker::run_reaper(pool.clone(), shutdown_rx));

    let state = AppState {
        pool,
        actions,
        admin_token: config.admin_token.into(),
    };

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/callback", post(callback::callback_handler))
        .route("/orders/{order_id}/capture", post(admin::capture_handler))
        .route("/orders/{order_id}/cancel", post(admin::cancel_handler))
        .route("/orders/{order_id}/refund", post(admin::refund_handler))
        .route("/orders/{order_id}/abort", post(admin::abort_handler))
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB, callbacks are a few hundred bytes
        .layer(TimeoutLayer::new(
            config.gateway.request_timeout + Duration::from_secs(15),
        ))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listen address");
    tracing::info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(worker_handle, reaper_handle);
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
