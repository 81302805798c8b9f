//! Webhook event processing.
//!
//! Dispatches authenticated events by kind. Only
//! `checkout.session.completed` does work: the session is resolved from the
//! provider and reconciled. Every other kind is acknowledged untouched.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::OrderStore;

use super::authenticator::{EventKind, WebhookEvent};
use super::gateway::CheckoutGateway;
use super::reconcile::{Reconciliation, ReconciliationEngine, ReconcileError};
use super::resolver::ResolverError;

/// How an event was handled. All outcomes are acknowledged with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The session was applied to the database.
    Reconciled(Reconciliation),
    /// The session does not exist at the provider; redelivery cannot help.
    SessionNotFound {
        /// The id from the event.
        session_id: String,
    },
    /// An event kind the storefront does not act on.
    Ignored {
        /// Stripe's `type` field.
        event_type: String,
    },
}

/// Failures that should make the provider redeliver the event.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The session could not be fetched.
    #[error("failed to resolve checkout session {session_id}: {source}")]
    Resolve {
        session_id: String,
        #[source]
        source: ResolverError,
    },

    /// The database work was rolled back.
    #[error("failed to reconcile checkout session {session_id}: {source}")]
    Reconcile {
        session_id: String,
        #[source]
        source: ReconcileError,
    },
}

/// Resolves and reconciles completed checkout sessions.
#[derive(Debug, Clone)]
pub struct WebhookProcessor<G, S> {
    gateway: G,
    engine: ReconciliationEngine<S>,
}

impl<G: CheckoutGateway, S: OrderStore> WebhookProcessor<G, S> {
    /// Create a processor.
    #[must_use]
    pub const fn new(gateway: G, engine: ReconciliationEngine<S>) -> Self {
        Self { gateway, engine }
    }

    /// Handle one authenticated event.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError` when resolution fails transiently or
    /// reconciliation rolls back. The event is then unprocessed and safe to
    /// redeliver.
    #[instrument(skip(self, event), fields(event_id = event.id.as_deref().unwrap_or("-")))]
    pub async fn process(&self, event: WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        let session = match event.kind {
            EventKind::CheckoutSessionCompleted(session) => session,
            EventKind::Unhandled { event_type } => {
                info!(event_type = %event_type, "Ignoring webhook event");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
        };

        let resolved = match self.gateway.resolve_session(&session.id).await {
            Ok(resolved) => resolved,
            Err(ResolverError::NotFound(message)) => {
                warn!(
                    session_id = %session.id,
                    error = %message,
                    "Completed session not found at provider, dropping event"
                );
                return Ok(WebhookOutcome::SessionNotFound {
                    session_id: session.id,
                });
            }
            Err(source) => {
                return Err(WebhookError::Resolve {
                    session_id: session.id,
                    source,
                });
            }
        };

        let reconciliation =
            self.engine
                .reconcile(&resolved)
                .await
                .map_err(|source| WebhookError::Reconcile {
                    session_id: session.id.clone(),
                    source,
                })?;

        Ok(WebhookOutcome::Reconciled(reconciliation))
    }
}
