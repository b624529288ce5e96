use {
    super::reconciler::{FailureRecovery, Reconciler, RetryPolicy},
    crate::domain::error::ReconcileError,
    crate::domain::id::OrderId,
    crate::infra::postgres::job_repo::{self, CallbackJob},
    sqlx::PgPool,
    std::{
        collections::HashSet,
        sync::{Arc, Mutex, PoisonError},
        time::Duration,
    },
    tokio::{sync::watch, task::JoinHandle},
};

/// Poll for pending callback jobs and reconcile their orders.
pub async fn run_worker(
    pool: PgPool,
    reconciler: Arc<Reconciler>,
    batch_size: i64,
    failure_retry: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(batch_size, "callback worker started");
    let recovery = Recovery::new(failure_retry, shutdown.clone());

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("callback worker shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        if let Err(e) = poll_once(&pool, &reconciler, batch_size, Some(&recovery)).await {
            tracing::error!(error = %e, "worker poll error");
        }
    }
}

/// Failed-order polling started after a job changed an order.
#[derive(Debug, Clone)]
pub struct Recovery {
    pub policy: RetryPolicy,
    pub shutdown: watch::Receiver<bool>,
    pub in_flight: InFlightOrders,
}

impl Recovery {
    pub fn new(policy: RetryPolicy, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            policy,
            shutdown,
            in_flight: InFlightOrders::default(),
        }
    }
}

/// Orders with a recovery poller running. At most one per order.
#[derive(Debug, Clone, Default)]
pub struct InFlightOrders(Arc<Mutex<HashSet<OrderId>>>);

impl InFlightOrders {
    /// `None` if the order already has a poller.
    pub fn claim(&self, order_id: &OrderId) -> Option<InFlightGuard> {
        let mut orders = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        orders.insert(order_id.clone()).then(|| InFlightGuard {
            orders: self.clone(),
            order_id: order_id.clone(),
        })
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(order_id)
    }
}

/// Releases the order when the poller ends, however it ends.
#[derive(Debug)]
pub struct InFlightGuard {
    orders: InFlightOrders,
    order_id: OrderId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.orders
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

pub async fn poll_once(
    pool: &PgPool,
    reconciler: &Arc<Reconciler>,
    batch_size: i64,
    recovery: Option<&Recovery>,
) -> Result<usize, ReconcileError> {
    let mut tx = pool.begin().await?;
    let jobs = job_repo::claim(&mut tx, batch_size).await?;
    tx.commit().await?;

    let claimed = jobs.len();
    for job in jobs {
        handle_job(pool, reconciler, job, recovery).await?;
    }

    Ok(claimed)
}

async fn handle_job(
    pool: &PgPool,
    reconciler: &Arc<Reconciler>,
    job: CallbackJob,
    recovery: Option<&Recovery>,
) -> Result<(), ReconcileError> {
    let order_id = match OrderId::new(&job.order_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(job_id = %job.id, order_id = %job.order_id, error = %e, "invalid order id, completing as garbage");
            return job_repo::complete(pool, job.id).await;
        }
    };

    let Ok(number) = u64::try_from(job.transaction_number) else {
        tracing::warn!(job_id = %job.id, transaction_number = job.transaction_number, "invalid transaction number, completing as garbage");
        return job_repo::complete(pool, job.id).await;
    };

    match reconciler
        .fetch_transactions_and_update_order(&order_id, Some(number))
        .await
    {
        Ok(summary) => {
            tracing::info!(job_id = %job.id, order_id = %order_id, ?summary, "callback job processed");
            if let Some(recovery) = recovery.filter(|_| summary.applied > 0) {
                if spawn_failure_recovery(reconciler.clone(), order_id.clone(), recovery).is_none() {
                    tracing::debug!(order_id = %order_id, "failure recovery already running");
                }
            }
            job_repo::complete(pool, job.id).await
        }
        Err(e) if e.is_permanent() => {
            tracing::warn!(job_id = %job.id, order_id = %order_id, error = %e, "permanent error, completing (no retry)");
            job_repo::complete(pool, job.id).await
        }
        Err(e) => {
            tracing::error!(
                job_id = %job.id,
                order_id = %order_id,
                attempts = job.attempts,
                error = %e,
                "callback job failed, scheduling retry"
            );
            job_repo::fail(pool, job.id, &e.to_string()).await
        }
    }
}

/// Start polling a failed order, unless a poller for it is already running.
/// The task returns at once unless the order is currently failed.
pub fn spawn_failure_recovery(
    reconciler: Arc<Reconciler>,
    order_id: OrderId,
    recovery: &Recovery,
) -> Option<JoinHandle<()>> {
    let guard = recovery.in_flight.claim(&order_id)?;
    let policy = recovery.policy;
    let shutdown = recovery.shutdown.clone();

    Some(tokio::spawn(async move {
        let _guard = guard;
        match reconciler
            .update_transactions_on_failure(&order_id, policy, shutdown)
            .await
        {
            Ok(FailureRecovery::NotFailed) => {}
            Ok(outcome) => tracing::info!(order_id = %order_id, ?outcome, "failure recovery finished"),
            Err(e) => tracing::error!(order_id = %order_id, error = %e, "failure recovery error"),
        }
    }))
}

/// Periodically reset jobs stuck in 'processing' back to 'pending'.
pub async fn run_reaper(pool: PgPool, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("stale job reaper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stale job reaper shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        }

        match job_repo::reap_stale(&pool).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "reaped stale jobs"),
            Err(e) => tracing::error!(error = %e, "reaper error"),
        }
    }
}
