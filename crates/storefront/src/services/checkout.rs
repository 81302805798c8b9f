//! Checkout session creation.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use fresh_blooms_core::{CartError, CartItem, Email, EmailError, OrderId, Paise, cart_total};

use crate::db::OrderStore;
use crate::models::NewPendingOrder;
use crate::stripe::{CheckoutSessionParams, StripeError};

use super::gateway::CheckoutGateway;

/// Placeholder Stripe replaces with the session id in the success URL.
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Errors from creating a checkout session.
#[derive(Debug, Error)]
pub enum InitiatorError {
    /// The cart has no items.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart line cannot be charged.
    #[error("invalid cart item: {0}")]
    InvalidItem(CartError),

    /// The supplied email is not an address.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The provider could not be reached or is failing. Safe to retry.
    #[error("payment provider unavailable: {0}")]
    Transient(String),

    /// The provider rejected the request.
    #[error("payment provider rejected the session: {0}")]
    Provider(String),
}

impl From<CartError> for InitiatorError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Empty => Self::EmptyCart,
            other => Self::InvalidItem(other),
        }
    }
}

impl From<StripeError> for InitiatorError {
    fn from(err: StripeError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Provider(err.to_string())
        }
    }
}

/// Outcome of a write whose failure must not fail the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum BestEffort<T> {
    /// The write happened.
    Recorded(T),
    /// Nothing to write; an equivalent row already exists.
    AlreadyPresent,
    /// The write failed; the error was logged.
    Failed(String),
}

impl<T> BestEffort<T> {
    /// Classify an insert-if-absent result.
    pub fn from_insert<E: Display>(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(value)) => Self::Recorded(value),
            Ok(None) => Self::AlreadyPresent,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    /// Whether the write failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Request body of `POST /api/create-checkout-session`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCheckout {
    pub session_id: String,
    /// Hosted payment page to redirect the shopper to.
    pub url: String,
    /// Total recorded on the pending order.
    pub total: Paise,
    pub pending_order: BestEffort<OrderId>,
}

/// Creates hosted checkout sessions and records pending orders.
#[derive(Debug, Clone)]
pub struct CheckoutInitiator<G, S> {
    gateway: G,
    store: S,
    base_url: Url,
    currency: String,
}

impl<G: CheckoutGateway, S: OrderStore> CheckoutInitiator<G, S> {
    /// Create an initiator. `base_url` is the storefront's public origin.
    #[must_use]
    pub const fn new(gateway: G, store: S, base_url: Url, currency: String) -> Self {
        Self {
            gateway,
            store,
            base_url,
            currency,
        }
    }

    /// Validate the cart, create a provider session, then try to record a
    /// `pending` order for it.
    ///
    /// The pending order is best-effort: if it cannot be written the session
    /// is still returned, and reconciliation will create the order when the
    /// payment completes.
    ///
    /// # Errors
    ///
    /// Returns `InitiatorError::EmptyCart`, `InvalidItem` or `InvalidEmail`
    /// before contacting the provider, and `Transient` or `Provider` if the
    /// provider call fails.
    #[instrument(skip(self, items, customer_email), fields(items = items.len()))]
    pub async fn create_session(
        &self,
        items: &[CartItem],
        customer_email: Option<&str>,
    ) -> Result<CreatedCheckout, InitiatorError> {
        let cart_total = cart_total(items)?;
        let customer_email = customer_email
            .filter(|email| !email.trim().is_empty())
            .map(Email::parse)
            .transpose()?;

        let (success_url, cancel_url) = redirect_urls(&self.base_url);
        let idempotency_key = Uuid::new_v4().to_string();

        let session = self
            .gateway
            .create_session(&CheckoutSessionParams {
                items,
                currency: &self.currency,
                customer_email: customer_email.as_ref().map(Email::as_str),
                success_url: &success_url,
                cancel_url: &cancel_url,
                idempotency_key: &idempotency_key,
            })
            .await?;

        let url = session.url.clone().ok_or_else(|| {
            InitiatorError::Provider(format!("session {} has no checkout URL", session.id))
        })?;

        let total = session.amount_total.map_or(cart_total, Paise::new);
        if total != cart_total {
            warn!(
                session_id = %session.id,
                cart_total = %cart_total,
                provider_total = %total,
                "Provider total differs from cart total"
            );
        }

        let pending_order = BestEffort::from_insert(
            self.store
                .insert_pending_order(&NewPendingOrder {
                    stripe_session_id: &session.id,
                    customer_email: customer_email.as_ref().map(Email::as_str),
                    total,
                })
                .await,
        );

        match &pending_order {
            BestEffort::Recorded(order_id) => {
                info!(session_id = %session.id, %order_id, "Pending order recorded");
            }
            BestEffort::AlreadyPresent => {
                info!(session_id = %session.id, "Pending order already present");
            }
            BestEffort::Failed(error) => {
                warn!(
                    session_id = %session.id,
                    error = %error,
                    "Failed to record pending order, reconciliation will create it"
                );
            }
        }

        Ok(CreatedCheckout {
            session_id: session.id,
            url,
            total,
            pending_order,
        })
    }
}

/// Success and cancel URLs under `base`.
///
/// The success URL carries Stripe's literal `{CHECKOUT_SESSION_ID}`
/// placeholder, which must not be percent-encoded.
#[must_use]
pub fn redirect_urls(base: &Url) -> (String, String) {
    let root = base.as_str().trim_end_matches('/');
    (
        format!("{root}/checkout.html?session_id={SESSION_ID_PLACEHOLDER}"),
        format!("{root}/cart.html"),
    )
}
