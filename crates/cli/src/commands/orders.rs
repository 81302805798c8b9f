//! Inspect recorded orders.

use serde::Serialize;

use fresh_blooms_storefront::db::{self, PgOrderStore};
use fresh_blooms_storefront::models::{Order, OrderItem};

use super::{CommandError, database_url, print_json};

#[derive(Serialize)]
struct OrderWithItems {
    #[serde(flatten)]
    order: Order,
    items: Vec<OrderItem>,
}

/// Print the order recorded for `session_id` with its line items.
///
/// # Errors
///
/// Returns `CommandError::OrderNotFound` if no order exists for the session,
/// or a database error.
pub async fn show(session_id: &str) -> Result<(), CommandError> {
    let pool = db::create_pool(&database_url()?, 2).await?;
    let store = PgOrderStore::new(pool);

    let order = store
        .find_by_session(session_id)
        .await?
        .ok_or_else(|| CommandError::OrderNotFound(session_id.to_string()))?;
    let items = store.items(order.id).await?;

    print_json(&OrderWithItems { order, items })
}
