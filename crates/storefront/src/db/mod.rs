//! Database operations for the storefront `PostgreSQL`.
//!
//! # Database: `fresh_blooms`
//!
//! The storefront is the source of truth for the catalog and for orders.
//!
//! ## Tables
//!
//! - `products` - Catalog, including the live `stock` count
//! - `orders` - One row per checkout session (`stripe_session_id` is unique)
//! - `order_items` - Line items of paid orders, unique per `(order_id, line_item_ref)`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p fresh-blooms-cli -- migrate
//! ```
//!
//! # Storage seams
//!
//! Reconciliation and checkout are written against [`OrderStore`] and
//! [`OrderTransaction`] rather than `PgPool` directly. [`PgOrderStore`] is the
//! production implementation; tests supply an in-memory one with the same
//! uniqueness and clamping rules.

mod orders;
mod products;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use fresh_blooms_core::{OrderId, OrderItemId, ProductId};

use crate::models::{NewOrderItem, NewPendingOrder, PaidOrder, UpsertedOrder};

pub use orders::{PgOrderStore, PgOrderTransaction};
pub use products::ProductRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Order persistence used by checkout and reconciliation.
pub trait OrderStore: Clone + Send + Sync + 'static {
    /// Transaction handle returned by [`OrderStore::begin`].
    type Tx: OrderTransaction;

    /// Start a transaction. Dropping the handle without committing rolls back.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, RepositoryError>> + Send;

    /// Insert a `pending` order unless one already exists for the session.
    ///
    /// Returns `None` when a row for the session was already present; the
    /// existing row is left untouched.
    fn insert_pending_order(
        &self,
        order: &NewPendingOrder<'_>,
    ) -> impl Future<Output = Result<Option<OrderId>, RepositoryError>> + Send;
}

/// Operations reconciliation performs inside one transaction.
pub trait OrderTransaction: Send {
    /// Create the session's order as `paid`, or promote the existing row.
    ///
    /// A promoted row takes the new total; its email is only filled in when
    /// it was previously empty.
    fn upsert_paid_order(
        &mut self,
        order: &PaidOrder<'_>,
    ) -> impl Future<Output = Result<UpsertedOrder, RepositoryError>> + Send;

    /// Name of a catalog product, `None` if the id is unknown.
    fn product_name(
        &mut self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Record a line item. Returns `None` if the `(order, line_item_ref)`
    /// pair was already recorded.
    fn insert_order_item(
        &mut self,
        item: &NewOrderItem<'_>,
    ) -> impl Future<Output = Result<Option<OrderItemId>, RepositoryError>> + Send;

    /// Subtract `quantity` from a product's stock, never going below zero.
    ///
    /// Returns the remaining stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<i32, RepositoryError>> + Send;

    /// Make every write in this transaction visible.
    fn commit(self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Convert a line quantity for an `INTEGER` column.
pub(crate) fn quantity_to_i32(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::DataCorruption(format!("quantity {quantity} out of range")))
}
