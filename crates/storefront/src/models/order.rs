//! Orders and their line items.

use chrono::{DateTime, Utc};
use serde::Serialize;

use fresh_blooms_core::{OrderId, OrderItemId, OrderStatus, Paise, ProductId};

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub stripe_session_id: String,
    pub customer_email: Option<String>,
    pub total_amount_paise: Paise,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// A stored order line.
///
/// `product_name` and `unit_price_paise` are snapshots taken at payment
/// time; later catalog edits do not change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` when the line could not be linked to a catalog product.
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub unit_price_paise: Paise,
    pub quantity: i32,
    /// Provider line item id, unique within an order.
    pub line_item_ref: String,
}

/// A `pending` order written when a checkout session is created.
#[derive(Debug, Clone, Copy)]
pub struct NewPendingOrder<'a> {
    pub stripe_session_id: &'a str,
    pub customer_email: Option<&'a str>,
    pub total: Paise,
}

/// The paid state of an order, as reported by the provider.
#[derive(Debug, Clone, Copy)]
pub struct PaidOrder<'a> {
    pub stripe_session_id: &'a str,
    pub customer_email: Option<&'a str>,
    pub total: Paise,
}

/// Whether [`upsert_paid_order`](crate::db::OrderTransaction::upsert_paid_order)
/// created the row or found an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// No row existed for the session.
    Created,
    /// A `pending` or `paid` row existed and now reads `paid`.
    Promoted,
}

/// Result of upserting a paid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertedOrder {
    pub id: OrderId,
    pub outcome: UpsertOutcome,
}

/// A line item to record against a paid order.
#[derive(Debug, Clone, Copy)]
pub struct NewOrderItem<'a> {
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub product_name: &'a str,
    pub unit_price: Paise,
    pub quantity: u32,
    pub line_item_ref: &'a str,
}
