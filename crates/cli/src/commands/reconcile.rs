//! Reconcile a checkout session by hand.
//!
//! Runs the same resolution and reconciliation as the webhook. Useful when
//! Stripe has given up redelivering an event, or to backfill a session whose
//! webhook was never configured. Safe to run repeatedly.

use tracing::info;

use fresh_blooms_storefront::config::StorefrontConfig;
use fresh_blooms_storefront::db::{self, PgOrderStore};
use fresh_blooms_storefront::services::{CheckoutGateway, ReconciliationEngine};
use fresh_blooms_storefront::stripe::StripeClient;

use super::{CommandError, print_json};

/// Resolve `session_id` from Stripe and reconcile it.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the session cannot be
/// resolved, or the reconciliation rolls back.
pub async fn run(session_id: &str) -> Result<(), CommandError> {
    let config = StorefrontConfig::from_env()?;
    let stripe = StripeClient::new(&config.stripe)?;
    let pool = db::create_pool(&config.database_url, 2).await?;

    info!(session_id, "Resolving checkout session");
    let session = stripe.resolve_session(session_id).await?;
    info!(
        line_items = session.line_items.len(),
        amount_total = %session.amount_total,
        "Session resolved"
    );

    let engine = ReconciliationEngine::new(PgOrderStore::new(pool), config.storage_timeout);
    let reconciliation = engine.reconcile(&session).await?;

    print_json(&reconciliation)
}
