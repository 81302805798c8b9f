//! The payment provider as seen by checkout and reconciliation.

use std::future::Future;

use crate::models::ResolvedSession;
use crate::stripe::types::CheckoutSession;
use crate::stripe::{CheckoutSessionParams, StripeClient, StripeError};

use super::resolver::{self, ResolverError};

/// Hosted checkout operations the storefront needs from the provider.
pub trait CheckoutGateway: Clone + Send + Sync + 'static {
    /// Create a hosted checkout session.
    fn create_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> impl Future<Output = Result<CheckoutSession, StripeError>> + Send;

    /// Fetch a session and all of its line items.
    fn resolve_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<ResolvedSession, ResolverError>> + Send;
}

impl CheckoutGateway for StripeClient {
    async fn create_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        self.create_checkout_session(params).await
    }

    async fn resolve_session(&self, session_id: &str) -> Result<ResolvedSession, ResolverError> {
        resolver::resolve_session(self, session_id).await
    }
}
