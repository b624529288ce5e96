use crate::domain::error::ReconcileError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CallbackJob {
    pub id: uuid::Uuid,
    pub order_id: String,
    pub transaction_number: i64,
    pub attempts: i32,
}

/// Enqueue a provider callback for async processing.
/// Returns `true` if inserted, `false` if a job for the same order/transaction
/// is still pending or processing.
pub async fn enqueue(
    pool: &sqlx::PgPool,
    order_id: &str,
    transaction_number: i64,
    payload: &serde_json::Value,
) -> Result<bool, ReconcileError> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        INSERT INTO callback_jobs (id, order_id, transaction_number, payload)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (order_id, transaction_number) WHERE status IN ('pending', 'processing')
            DO NOTHING
        RETURNING true
        "#,
    )
    .bind(uuid::Uuid::now_v7())
    .bind(order_id)
    .bind(transaction_number)
    .bind(payload)
    .fetch_optional(pool)
    .await?;

    Ok(inserted.is_some())
}

/// Claim up to `limit` pending jobs for processing.
/// Uses SKIP LOCKED to avoid contention with other workers.
pub async fn claim(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    limit: i64,
) -> Result<Vec<CallbackJob>, ReconcileError> {
    let rows = sqlx::query_as::<_, CallbackJob>(
        r#"
        UPDATE callback_jobs
        SET status = 'processing', updated_at = now()
        WHERE id IN (
            SELECT id FROM callback_jobs
            WHERE status = 'pending' AND scheduled_at <= now()
            ORDER BY scheduled_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, order_id, transaction_number, attempts
        "#,
    )
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows)
}

pub async fn complete(pool: &sqlx::PgPool, id: uuid::Uuid) -> Result<(), ReconcileError> {
    sqlx::query("UPDATE callback_jobs SET status = 'completed', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failure with exponential backoff via scheduled_at.
/// At max attempts the job is parked as 'failed'.
pub async fn fail(pool: &sqlx::PgPool, id: uuid::Uuid, error: &str) -> Result<(), ReconcileError> {
    sqlx::query(
        r#"
        UPDATE callback_jobs
        SET attempts = attempts + 1,
            last_error = $2,
            status = CASE
                WHEN attempts + 1 >= max_attempts THEN 'failed'
                ELSE 'pending'
            END,
            scheduled_at = CASE
                WHEN attempts + 1 >= max_attempts THEN scheduled_at
                ELSE now() + make_interval(secs => power(2, attempts + 1)::int)
            END,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reset jobs stuck in 'processing' for more than 2 minutes.
pub async fn reap_stale(pool: &sqlx::PgPool) -> Result<u64, ReconcileError> {
    let result = sqlx::query(
        r#"
        UPDATE callback_jobs
        SET status = 'pending', updated_at = now()
        WHERE status = 'processing' AND updated_at < now() - interval '2 minutes'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
