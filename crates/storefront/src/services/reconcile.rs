//! Order reconciliation.
//!
//! Applies a resolved checkout session to the database as one transaction:
//!
//! 1. Upsert the order by session id and mark it `paid` with the provider's
//!    total.
//! 2. Record each line item once per `(order, line item id)`. Lines linked to
//!    a catalog product decrement that product's stock, clamped at zero, but
//!    only when the line was newly recorded. Unlinked lines are recorded with
//!    a name snapshot and leave stock alone.
//! 3. Commit.
//!
//! Steps 1 and 2 run under the storage timeout. If anything fails the
//! transaction is dropped and nothing is visible. Running the same session
//! twice leaves the database as the first run did.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use fresh_blooms_core::{OrderId, ProductId};

use crate::db::{OrderStore, OrderTransaction, RepositoryError};
use crate::models::{NewOrderItem, PaidOrder, ResolvedSession, UpsertOutcome};

/// Name snapshot when neither the provider nor the catalog has one.
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown";

/// Errors from reconciliation. Nothing was written in either case.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A storage operation failed and the transaction was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    /// The unit of work did not finish in time and was rolled back.
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

/// A stock change made while reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Stock after the clamped decrement.
    pub remaining: i32,
}

/// What a committed reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub order_id: OrderId,
    pub order: UpsertOutcome,
    /// Line items recorded by this run.
    pub items_recorded: usize,
    /// Line items already recorded by an earlier run.
    pub items_skipped: usize,
    /// Recorded line items without a catalog product.
    pub unlinked_items: usize,
    pub stock_adjustments: Vec<StockAdjustment>,
}

impl Reconciliation {
    /// Whether this run changed nothing but the order's status and total.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        self.items_recorded == 0 && self.items_skipped > 0
    }
}

/// Reconciles resolved sessions against an [`OrderStore`].
#[derive(Debug, Clone)]
pub struct ReconciliationEngine<S> {
    store: S,
    timeout: Duration,
}

impl<S: OrderStore> ReconciliationEngine<S> {
    /// Create an engine. `timeout` bounds everything before the commit.
    #[must_use]
    pub const fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Apply `session` in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Storage` if any statement or the commit
    /// fails, or `ReconcileError::Timeout` if the work before the commit
    /// takes longer than the configured timeout. No partial writes remain
    /// in either case.
    #[instrument(
        skip(self, session),
        fields(session_id = %session.session_id, line_items = session.line_items.len())
    )]
    pub async fn reconcile(&self, session: &ResolvedSession) -> Result<Reconciliation, ReconcileError> {
        let work = async {
            let mut tx = self.store.begin().await?;
            let reconciliation = apply_session(&mut tx, session).await?;
            Ok::<_, RepositoryError>((tx, reconciliation))
        };

        let (tx, reconciliation) = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| ReconcileError::Timeout(self.timeout))??;

        // Not under the timeout: abandoning an in-flight commit would leave
        // its outcome unknown.
        tx.commit().await?;

        info!(
            order_id = %reconciliation.order_id,
            order = ?reconciliation.order,
            items_recorded = reconciliation.items_recorded,
            items_skipped = reconciliation.items_skipped,
            unlinked_items = reconciliation.unlinked_items,
            "Order reconciled"
        );

        Ok(reconciliation)
    }
}

async fn apply_session<T: OrderTransaction>(
    tx: &mut T,
    session: &ResolvedSession,
) -> Result<Reconciliation, RepositoryError> {
    let order = tx
        .upsert_paid_order(&PaidOrder {
            stripe_session_id: &session.session_id,
            customer_email: session.customer_email.as_deref(),
            total: session.amount_total,
        })
        .await?;

    let mut reconciliation = Reconciliation {
        order_id: order.id,
        order: order.outcome,
        items_recorded: 0,
        items_skipped: 0,
        unlinked_items: 0,
        stock_adjustments: Vec::new(),
    };

    for item in &session.line_items {
        let linked = match item.product_id {
            Some(product_id) => match tx.product_name(product_id).await? {
                Some(name) => Some((product_id, name)),
                None => {
                    warn!(
                        %product_id,
                        line_item = %item.line_item_id,
                        "Line item references an unknown product, recording unlinked"
                    );
                    None
                }
            },
            None => None,
        };

        let product_name = item
            .display_name()
            .or_else(|| linked.as_ref().map(|(_, name)| name.as_str()))
            .unwrap_or(UNKNOWN_PRODUCT_NAME);

        let inserted = tx
            .insert_order_item(&NewOrderItem {
                order_id: order.id,
                product_id: linked.as_ref().map(|(id, _)| *id),
                product_name,
                unit_price: item.unit_amount,
                quantity: item.quantity,
                line_item_ref: &item.line_item_id,
            })
            .await?;

        if inserted.is_none() {
            debug!(line_item = %item.line_item_id, "Line item already recorded");
            reconciliation.items_skipped += 1;
            continue;
        }
        reconciliation.items_recorded += 1;

        match linked {
            Some((product_id, _)) => {
                let remaining = tx.decrement_stock(product_id, item.quantity).await?;
                reconciliation.stock_adjustments.push(StockAdjustment {
                    product_id,
                    quantity: item.quantity,
                    remaining,
                });
            }
            None => reconciliation.unlinked_items += 1,
        }
    }

    Ok(reconciliation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn reconciliation(recorded: usize, skipped: usize) -> Reconciliation {
        Reconciliation {
            order_id: OrderId::new(1),
            order: UpsertOutcome::Promoted,
            items_recorded: recorded,
            items_skipped: skipped,
            unlinked_items: 0,
            stock_adjustments: Vec::new(),
        }
    }

    #[test]
    fn test_replay_requires_only_skipped_lines() {
        assert!(reconciliation(0, 2).is_replay());
        assert!(!reconciliation(2, 0).is_replay());
        assert!(!reconciliation(1, 1).is_replay());
        // A session without line items records nothing but is not a replay.
        assert!(!reconciliation(0, 0).is_replay());
    }

    #[test]
    fn test_summary_serializes_for_the_cli() {
        let mut summary = reconciliation(1, 0);
        summary.stock_adjustments.push(StockAdjustment {
            product_id: ProductId::new(7),
            quantity: 2,
            remaining: 10,
        });

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["items_recorded"], 1);
        assert_eq!(json["stock_adjustments"][0]["product_id"], 7);
        assert_eq!(json["stock_adjustments"][0]["remaining"], 10);
    }
}
