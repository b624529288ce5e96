use {
    crate::domain::error::ReconcileError,
    crate::domain::id::{OrderId, PaymentId, PaymentOrderId},
    crate::domain::money::MoneyAmount,
    crate::domain::order::{Order, OrderStatus, PaymentMethod},
    crate::domain::store::{OrderStore, PaymentTokenRecord, StoreFuture},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    status: String,
    payment_method: String,
    payment_id: Option<String>,
    payment_order_id: Option<String>,
    amount: i64,
    vat_amount: i64,
    customer_id: Option<String>,
    needs_save_token: bool,
}

impl TryFrom<OrderRow> for Order {
    type Error = ReconcileError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            order_id: OrderId::new(row.order_id)?,
            status: OrderStatus::try_from(row.status.as_str())?,
            payment_method: PaymentMethod::try_from(row.payment_method.as_str())?,
            payment_id: row.payment_id.map(PaymentId::new).transpose()?,
            payment_order_id: row.payment_order_id.map(PaymentOrderId::new).transpose()?,
            amount: MoneyAmount::new(row.amount)?,
            vat_amount: MoneyAmount::new(row.vat_amount)?,
            customer_id: row.customer_id,
            needs_save_token: row.needs_save_token,
        })
    }
}

/// PostgreSQL mirror of the shop's orders, notes, tokens and credit memos.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace an order snapshot.
    pub async fn upsert_order(&self, order: &Order) -> Result<(), ReconcileError> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, status, payment_method, payment_id, payment_order_id,
                 amount, vat_amount, customer_id, needs_save_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (order_id) DO UPDATE SET
                status = EXCLUDED.status,
                payment_method = EXCLUDED.payment_method,
                payment_id = EXCLUDED.payment_id,
                payment_order_id = EXCLUDED.payment_order_id,
                amount = EXCLUDED.amount,
                vat_amount = EXCLUDED.vat_amount,
                customer_id = EXCLUDED.customer_id,
                needs_save_token = EXCLUDED.needs_save_token,
                updated_at = now()
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_id.as_ref().map(PaymentId::as_str))
        .bind(order.payment_order_id.as_ref().map(PaymentOrderId::as_str))
        .bind(i64::from(order.amount))
        .bind(i64::from(order.vat_amount))
        .bind(order.customer_id.as_deref())
        .bind(order.needs_save_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Notes of an order, oldest first.
    pub async fn notes(&self, order_id: &OrderId) -> Result<Vec<String>, ReconcileError> {
        let notes = sqlx::query_scalar(
            "SELECT message FROM order_notes WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    /// While set, `create_credit_memo` is a no-op for the order. Used when
    /// the refund was created on the shop side and already has its memo.
    pub async fn set_refund_blocked(
        &self,
        order_id: &OrderId,
        blocked: bool,
    ) -> Result<(), ReconcileError> {
        sqlx::query("UPDATE orders SET refund_blocked = $2, updated_at = now() WHERE order_id = $1")
            .bind(order_id.as_str())
            .bind(blocked)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, ReconcileError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, status, payment_method, payment_id, payment_order_id,
                   amount, vat_amount, customer_id, needs_save_token
            FROM orders WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ReconcileError::OrderNotFound(order_id.to_string()))?;

        Order::try_from(row)
    }

    async fn transaction_used(
        &self,
        order_id: &OrderId,
        number: i64,
    ) -> Result<bool, ReconcileError> {
        let used: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT true FROM order_status_transactions
            WHERE order_id = $1 AND transaction_number = $2
            UNION ALL
            SELECT true FROM orders
            WHERE order_id = $1 AND transaction_id = $2::text
            LIMIT 1
            "#,
        )
        .bind(order_id.as_str())
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(used.is_some())
    }

    async fn update_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        note: Option<&str>,
        transaction_number: Option<u64>,
    ) -> Result<(), ReconcileError> {
        let number = transaction_number.map(to_db_number).transpose()?;

        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1 FOR UPDATE")
                .bind(order_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| ReconcileError::OrderNotFound(order_id.to_string()))?;
        let current = OrderStatus::try_from(current.as_str())?;

        if let Some(number) = number {
            let inserted: Option<bool> = sqlx::query_scalar(
                r#"
                INSERT INTO order_status_transactions (order_id, transaction_number, status)
                VALUES ($1, $2, $3)
                ON CONFLICT (order_id, transaction_number) DO NOTHING
                RETURNING true
                "#,
            )
            .bind(order_id.as_str())
            .bind(number)
            .bind(status.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            if inserted.is_none() {
                tracing::info!(order_id = %order_id, transaction_number = number, "transaction already used for a status update");
                tx.commit().await?;
                return Ok(());
            }
        }

        // A paid order is not moved to failed by a late failure; only noted.
        let keep_status = current == status || (status == OrderStatus::Failed && current.is_paid());
        if !keep_status {
            sqlx::query(
                r#"
                UPDATE orders
                SET status = $2,
                    transaction_id = COALESCE($3::text, transaction_id),
                    updated_at = now()
                WHERE order_id = $1
                "#,
            )
            .bind(order_id.as_str())
            .bind(status.as_str())
            .bind(number.map(|n| n.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(note) = note {
            insert_note(&mut tx, order_id, note).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn credit_memo(
        &self,
        order_id: &OrderId,
        amount: MoneyAmount,
        transaction_id: &str,
        description: &str,
    ) -> Result<(), ReconcileError> {
        if transaction_id.is_empty() {
            return Err(ReconcileError::OrderStore(
                "credit memo needs a transaction id".into(),
            ));
        }

        let blocked: Option<bool> =
            sqlx::query_scalar("SELECT refund_blocked FROM orders WHERE order_id = $1")
                .bind(order_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match blocked {
            None => return Err(ReconcileError::OrderNotFound(order_id.to_string())),
            Some(true) => {
                tracing::info!(order_id = %order_id, transaction_id, "refund blocked, credit memo skipped");
                return Ok(());
            }
            Some(false) => {}
        }

        sqlx::query(
            r#"
            INSERT INTO credit_memos (id, order_id, transaction_id, amount, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(order_id.as_str())
        .bind(transaction_id)
        .bind(i64::from(amount))
        .bind(description)
        .execute(&self.pool)
        .await?;

        tracing::info!(order_id = %order_id, transaction_id, amount = %amount, "credit memo created");
        Ok(())
    }
}

fn to_db_number(number: u64) -> Result<i64, ReconcileError> {
    i64::try_from(number).map_err(|_| {
        ReconcileError::Validation(format!("transaction number out of range: {number}"))
    })
}

async fn insert_note(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: &OrderId,
    message: &str,
) -> Result<(), ReconcileError> {
    sqlx::query("INSERT INTO order_notes (id, order_id, message) VALUES ($1, $2, $3)")
        .bind(Uuid::now_v7())
        .bind(order_id.as_str())
        .bind(message)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl OrderStore for PgOrderStore {
    fn get_order<'a>(&'a self, order_id: &'a OrderId) -> StoreFuture<'a, Order> {
        Box::pin(self.fetch_order(order_id))
    }

    fn update_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        status: OrderStatus,
        note: Option<&'a str>,
        transaction_number: Option<u64>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.update_status(order_id, status, note, transaction_number))
    }

    fn can_update_order_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        _status: OrderStatus,
        transaction_number: Option<u64>,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let Some(number) = transaction_number else {
                return Ok(true);
            };
            let used = self.transaction_used(order_id, to_db_number(number)?).await?;
            Ok(!used)
        })
    }

    fn add_order_note<'a>(&'a self, order_id: &'a OrderId, message: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            insert_note(&mut tx, order_id, message).await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn set_payment_id<'a>(
        &'a self,
        order_id: &'a OrderId,
        payment_id: &'a PaymentId,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE orders SET payment_id = $2, updated_at = now() WHERE order_id = $1")
                .bind(order_id.as_str())
                .bind(payment_id.as_str())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn save_payment_token<'a>(&'a self, token: &'a PaymentTokenRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO payment_tokens
                    (id, customer_id, payment_token, recurrence_token, card_brand,
                     masked_pan, expiry_date, order_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (customer_id, (COALESCE(payment_token, '')), (COALESCE(recurrence_token, '')))
                DO NOTHING
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(&token.customer_id)
            .bind(token.payment_token.as_deref())
            .bind(token.recurrence_token.as_deref())
            .bind(token.card_brand.as_deref())
            .bind(token.masked_pan.as_deref())
            .bind(token.expiry_date.as_deref())
            .bind(token.order_id.as_ref().map(OrderId::as_str))
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn create_credit_memo<'a>(
        &'a self,
        order_id: &'a OrderId,
        amount: MoneyAmount,
        transaction_id: &'a str,
        description: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.credit_memo(order_id, amount, transaction_id, description))
    }

    fn is_credit_memo_exist<'a>(&'a self, transaction_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let exists: Option<bool> =
                sqlx::query_scalar("SELECT true FROM credit_memos WHERE transaction_id = $1")
                    .bind(transaction_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(exists.is_some())
        })
    }
}
