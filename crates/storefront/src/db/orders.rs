//! `PostgreSQL` order storage.
//!
//! Every write here is safe to race with a concurrent redelivery of the same
//! webhook: the order insert is an upsert on the unique session id, line
//! items use `ON CONFLICT DO NOTHING` on `(order_id, line_item_ref)`, and the
//! stock decrement is a single clamped `UPDATE`.

use sqlx::{PgPool, Postgres, Transaction};

use fresh_blooms_core::{OrderId, OrderItemId, ProductId};

use super::{OrderStore, OrderTransaction, RepositoryError, quantity_to_i32};
use crate::models::{
    NewOrderItem, NewPendingOrder, Order, OrderItem, PaidOrder, UpsertOutcome, UpsertedOrder,
};

/// Order storage backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up the order recorded for a checkout session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_session(
        &self,
        stripe_session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            r"
            SELECT id, stripe_session_id, customer_email, total_amount_paise, status, created_at
            FROM orders
            WHERE stripe_session_id = $1
            ",
        )
        .bind(stripe_session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// All recorded line items of an order, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r"
            SELECT id, order_id, product_id, product_name, unit_price_paise, quantity, line_item_ref
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

impl OrderStore for PgOrderStore {
    type Tx = PgOrderTransaction;

    async fn begin(&self) -> Result<PgOrderTransaction, RepositoryError> {
        Ok(PgOrderTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn insert_pending_order(
        &self,
        order: &NewPendingOrder<'_>,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, OrderId>(
            r"
            INSERT INTO orders (stripe_session_id, customer_email, total_amount_paise, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (stripe_session_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(order.stripe_session_id)
        .bind(order.customer_email)
        .bind(order.total)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}

/// An open reconciliation transaction. Rolls back on drop.
#[derive(Debug)]
pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

impl OrderTransaction for PgOrderTransaction {
    async fn upsert_paid_order(
        &mut self,
        order: &PaidOrder<'_>,
    ) -> Result<UpsertedOrder, RepositoryError> {
        // xmax is zero only for a tuple this statement inserted.
        let (id, inserted) = sqlx::query_as::<_, (OrderId, bool)>(
            r"
            INSERT INTO orders (stripe_session_id, customer_email, total_amount_paise, status)
            VALUES ($1, $2, $3, 'paid')
            ON CONFLICT (stripe_session_id) DO UPDATE
               SET status = 'paid',
                   total_amount_paise = EXCLUDED.total_amount_paise,
                   customer_email = COALESCE(orders.customer_email, EXCLUDED.customer_email)
            RETURNING id, (xmax = 0) AS inserted
            ",
        )
        .bind(order.stripe_session_id)
        .bind(order.customer_email)
        .bind(order.total)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(UpsertedOrder {
            id,
            outcome: if inserted {
                UpsertOutcome::Created
            } else {
                UpsertOutcome::Promoted
            },
        })
    }

    async fn product_name(&mut self, id: ProductId) -> Result<Option<String>, RepositoryError> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(name)
    }

    async fn insert_order_item(
        &mut self,
        item: &NewOrderItem<'_>,
    ) -> Result<Option<OrderItemId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, OrderItemId>(
            r"
            INSERT INTO order_items
                (order_id, product_id, product_name, unit_price_paise, quantity, line_item_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id, line_item_ref) DO NOTHING
            RETURNING id
            ",
        )
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.product_name)
        .bind(item.unit_price)
        .bind(quantity_to_i32(item.quantity)?)
        .bind(item.line_item_ref)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<i32, RepositoryError> {
        let remaining = sqlx::query_scalar::<_, i32>(
            r"
            UPDATE products
               SET stock = GREATEST(stock - $2, 0)
             WHERE id = $1
            RETURNING stock
            ",
        )
        .bind(id)
        .bind(quantity_to_i32(quantity)?)
        .fetch_optional(&mut *self.tx)
        .await?;

        remaining.ok_or(RepositoryError::NotFound)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
