//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::PgOrderStore;
use crate::services::{
    CheckoutInitiator, ReconciliationEngine, WebhookAuthenticator, WebhookProcessor,
};
use crate::stripe::{StripeClient, StripeError};

/// Checkout initiator wired to Stripe and `PostgreSQL`.
pub type StoreCheckout = CheckoutInitiator<StripeClient, PgOrderStore>;

/// Webhook processor wired to Stripe and `PostgreSQL`.
pub type StoreWebhooks = WebhookProcessor<StripeClient, PgOrderStore>;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and owns the database pool
/// and Stripe client every service is built from.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    authenticator: WebhookAuthenticator,
    checkout: StoreCheckout,
    webhooks: StoreWebhooks,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if the Stripe HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StripeError> {
        let stripe = StripeClient::new(&config.stripe)?;
        let store = PgOrderStore::new(pool.clone());

        let authenticator = WebhookAuthenticator::new(config.stripe.webhook_secret.clone());
        let checkout = CheckoutInitiator::new(
            stripe.clone(),
            store.clone(),
            config.base_url.clone(),
            config.stripe.currency.clone(),
        );
        let webhooks = WebhookProcessor::new(
            stripe,
            ReconciliationEngine::new(store, config.storage_timeout),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                authenticator,
                checkout,
                webhooks,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the webhook authenticator.
    #[must_use]
    pub fn authenticator(&self) -> &WebhookAuthenticator {
        &self.inner.authenticator
    }

    /// Get a reference to the checkout initiator.
    #[must_use]
    pub fn checkout(&self) -> &StoreCheckout {
        &self.inner.checkout
    }

    /// Get a reference to the webhook processor.
    #[must_use]
    pub fn webhooks(&self) -> &StoreWebhooks {
        &self.inner.webhooks
    }
}
