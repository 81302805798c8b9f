//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `authenticator` - Verify and parse Stripe webhook deliveries
//! - `resolver` - Fetch a checkout session and its line items from Stripe
//! - `reconcile` - Apply a paid session to orders, order items and stock
//! - `checkout` - Create checkout sessions and pending orders
//! - `webhook` - Dispatch authenticated events
//!
//! `checkout`, `reconcile` and `webhook` are generic over [`CheckoutGateway`]
//! and [`OrderStore`](crate::db::OrderStore), so they run unchanged against
//! Stripe and `PostgreSQL` or against in-memory doubles.

pub mod authenticator;
pub mod checkout;
pub mod gateway;
pub mod reconcile;
pub mod resolver;
pub mod webhook;

pub use authenticator::{
    AuthError, EventKind, WebhookAuthenticator, WebhookEvent, signature_header,
};
pub use checkout::{BestEffort, CheckoutInitiator, CheckoutRequest, CreatedCheckout, InitiatorError};
pub use gateway::CheckoutGateway;
pub use reconcile::{ReconcileError, Reconciliation, ReconciliationEngine, StockAdjustment};
pub use resolver::ResolverError;
pub use webhook::{WebhookError, WebhookOutcome, WebhookProcessor};
