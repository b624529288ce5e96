use {
    crate::domain::error::ReconcileError,
    crate::domain::id::OrderId,
    crate::domain::ledger::{
        Lease, OrderLease, RecordOutcome, TransactionField, TransactionStore, is_new_observation,
    },
    crate::domain::store::StoreFuture,
    crate::domain::transaction::{Transaction, TransactionState},
    sqlx::{PgConnection, PgPool, Postgres},
    std::collections::BTreeSet,
};

/// Append-only `order_transactions` ledger.
#[derive(Debug, Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn number_to_db(number: u64) -> Result<i64, ReconcileError> {
    i64::try_from(number).map_err(|_| {
        ReconcileError::Validation(format!("transaction number out of range: {number}"))
    })
}

/// Holds the order's advisory lock for the life of one database
/// transaction. Staged rows are visible to later checks in the same
/// transaction; dropping the lease rolls them back.
struct PgLease {
    tx: sqlx::Transaction<'static, Postgres>,
    order_id: OrderId,
}

async fn lock(pool: &PgPool, order_id: &OrderId) -> Result<PgLease, ReconcileError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '30s'")
        .execute(&mut *tx)
        .await?;

    // Serialize per order. The lock works before any row for the order
    // exists.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(order_id.as_str())
        .execute(&mut *tx)
        .await?;

    Ok(PgLease {
        tx,
        order_id: order_id.clone(),
    })
}

async fn record(
    conn: &mut PgConnection,
    order_id: &OrderId,
    transaction: &Transaction,
) -> Result<RecordOutcome, ReconcileError> {
    let number = number_to_db(transaction.number)?;
    let payload = serde_json::to_value(transaction)?;

    let states: Vec<String> = sqlx::query_scalar(
        "SELECT state FROM order_transactions WHERE order_id = $1 AND number = $2",
    )
    .bind(order_id.as_str())
    .bind(number)
    .fetch_all(&mut *conn)
    .await?;

    let recorded = states
        .iter()
        .map(|s| TransactionState::try_from(s.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    if !is_new_observation(&recorded, transaction.state) {
        return Ok(RecordOutcome::Duplicate);
    }

    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        INSERT INTO order_transactions
            (order_id, number, state, transaction_id, transaction_type, payee_reference, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (order_id, number, state) DO NOTHING
        RETURNING true
        "#,
    )
    .bind(order_id.as_str())
    .bind(number)
    .bind(transaction.state.as_str())
    .bind(&transaction.id)
    .bind(transaction.transaction_type.as_str())
    .bind(transaction.payee_reference.as_deref())
    .bind(&payload)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(if inserted.is_some() {
        RecordOutcome::Applied
    } else {
        RecordOutcome::Duplicate
    })
}

impl<'a> OrderLease<'a> for PgLease {
    fn record_if_new<'b>(
        &'b mut self,
        transaction: &'b Transaction,
    ) -> StoreFuture<'b, RecordOutcome> {
        Box::pin(record(&mut *self.tx, &self.order_id, transaction))
    }

    fn commit(self: Box<Self>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.tx.commit().await?;
            Ok(())
        })
    }
}

async fn find(
    pool: &PgPool,
    order_id: Option<&OrderId>,
    field: TransactionField,
    value: &str,
) -> Result<Option<Transaction>, ReconcileError> {
    let column = match field {
        TransactionField::Number => "number",
        TransactionField::Id => "transaction_id",
        TransactionField::PayeeReference => "payee_reference",
    };
    let sql = format!(
        "SELECT payload FROM order_transactions \
         WHERE {column} = $1 AND ($2::text IS NULL OR order_id = $2) \
         ORDER BY recorded_at DESC LIMIT 1"
    );

    let query = sqlx::query_scalar::<Postgres, serde_json::Value>(&sql);
    let query = match field {
        TransactionField::Number => {
            let Ok(number) = value.parse::<i64>() else {
                return Ok(None);
            };
            query.bind(number)
        }
        TransactionField::Id | TransactionField::PayeeReference => query.bind(value),
    };

    let payload = query
        .bind(order_id.map(OrderId::as_str))
        .fetch_optional(pool)
        .await?;

    payload
        .map(serde_json::from_value)
        .transpose()
        .map_err(ReconcileError::from)
}

impl TransactionStore for PgTransactionStore {
    fn lock_order<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, Lease<'a>> {
        Box::pin(async move {
            let lease: Lease<'a> = Box::new(lock(&self.pool, order_id).await?);
            Ok(lease)
        })
    }

    fn find_by_field<'a>(
        &'a self,
        field: TransactionField,
        value: &'a str,
    ) -> StoreFuture<'a, Option<Transaction>> {
        Box::pin(find(&self.pool, None, field, value))
    }

    fn find_in_order<'a>(
        &'a self,
        order_id: &'a OrderId,
        field: TransactionField,
        value: &'a str,
    ) -> StoreFuture<'a, Option<Transaction>> {
        Box::pin(find(&self.pool, Some(order_id), field, value))
    }

    fn applied_numbers<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, BTreeSet<u64>> {
        Box::pin(async move {
            let numbers: Vec<i64> = sqlx::query_scalar(
                "SELECT DISTINCT number FROM order_transactions WHERE order_id = $1",
            )
            .bind(order_id.as_str())
            .fetch_all(&self.pool)
            .await?;

            Ok(numbers
                .into_iter()
                .filter_map(|n| u64::try_from(n).ok())
                .collect())
        })
    }
}
