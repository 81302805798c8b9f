//! Domain models for the storefront.
//!
//! Row types derive `sqlx::FromRow` and are used directly; the write-side
//! structs borrow their inputs so reconciliation never clones line items.

pub mod order;
pub mod product;
pub mod session;

pub use order::{NewOrderItem, NewPendingOrder, Order, OrderItem, PaidOrder, UpsertOutcome, UpsertedOrder};
pub use product::Product;
pub use session::{ResolvedLineItem, ResolvedSession};
