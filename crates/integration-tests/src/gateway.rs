//! Scripted payment provider.
//!
//! Every created session is also registered as completed, with one line item
//! per cart line linked to its catalog product, so a test can create a
//! checkout and then deliver its completion event.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use fresh_blooms_core::{CartItem, Paise, cart_total};
use fresh_blooms_storefront::models::{ResolvedLineItem, ResolvedSession};
use fresh_blooms_storefront::services::{CheckoutGateway, ResolverError};
use fresh_blooms_storefront::stripe::types::CheckoutSession;
use fresh_blooms_storefront::stripe::{CheckoutSessionParams, StripeError};

/// A failure to return from `create_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFault {
    /// Provider outage (503).
    Unavailable,
    /// Request rejected (400).
    Rejected,
    /// Session created without a hosted page URL.
    MissingUrl,
}

/// A failure to return from `resolve_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveFault {
    NotFound,
    Unavailable,
}

/// What the initiator sent for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub items: Vec<CartItem>,
    pub currency: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub idempotency_key: String,
}

#[derive(Debug, Default)]
struct State {
    next_session: u32,
    created: Vec<CreatedSession>,
    sessions: HashMap<String, ResolvedSession>,
    create_fault: Option<CreateFault>,
    resolve_faults: HashMap<String, ResolveFault>,
    resolve_calls: usize,
}

/// A [`CheckoutGateway`] that never leaves the process.
#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<State>>,
}

impl FakeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create_session` fail.
    pub async fn fail_create(&self, fault: CreateFault) {
        self.state.lock().await.create_fault = Some(fault);
    }

    /// Make resolving `session_id` fail.
    pub async fn fail_resolve(&self, session_id: &str, fault: ResolveFault) {
        self.state
            .lock()
            .await
            .resolve_faults
            .insert(session_id.to_string(), fault);
    }

    /// Stop failing resolution of `session_id`.
    pub async fn heal_resolve(&self, session_id: &str) {
        self.state.lock().await.resolve_faults.remove(session_id);
    }

    /// Register a completed session.
    pub async fn insert_session(&self, session: ResolvedSession) {
        self.state
            .lock()
            .await
            .sessions
            .insert(session.session_id.clone(), session);
    }

    /// Sessions created so far, oldest first.
    pub async fn created(&self) -> Vec<CreatedSession> {
        self.state.lock().await.created.clone()
    }

    /// How many times `resolve_session` was called.
    pub async fn resolve_calls(&self) -> usize {
        self.state.lock().await.resolve_calls
    }
}

fn completed_session(session_id: &str, params: &CheckoutSessionParams<'_>) -> ResolvedSession {
    let line_items = params
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| ResolvedLineItem {
            line_item_id: format!("li_{session_id}_{i}"),
            quantity: item.qty,
            unit_amount: item.price_in_paise,
            description: Some(item.name.clone()),
            product_name: Some(item.name.clone()),
            product_id: Some(item.id),
        })
        .collect();

    ResolvedSession {
        session_id: session_id.to_string(),
        amount_total: cart_total(params.items).unwrap_or(Paise::ZERO),
        customer_email: params.customer_email.map(str::to_string),
        line_items,
    }
}

impl CheckoutGateway for FakeGateway {
    async fn create_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let mut state = self.state.lock().await;
        match state.create_fault {
            Some(CreateFault::Unavailable) => {
                return Err(StripeError::Api {
                    status: 503,
                    message: "service unavailable".to_string(),
                });
            }
            Some(CreateFault::Rejected) => {
                return Err(StripeError::Api {
                    status: 400,
                    message: "Invalid currency: xyz".to_string(),
                });
            }
            Some(CreateFault::MissingUrl) | None => {}
        }

        state.next_session += 1;
        let session_id = format!("cs_test_fake_{}", state.next_session);

        state.created.push(CreatedSession {
            session_id: session_id.clone(),
            items: params.items.to_vec(),
            currency: params.currency.to_string(),
            customer_email: params.customer_email.map(str::to_string),
            success_url: params.success_url.to_string(),
            cancel_url: params.cancel_url.to_string(),
            idempotency_key: params.idempotency_key.to_string(),
        });
        let completed = completed_session(&session_id, params);
        let amount_total = completed.amount_total.as_i64();
        state.sessions.insert(session_id.clone(), completed);

        let url = (state.create_fault != Some(CreateFault::MissingUrl))
            .then(|| format!("https://checkout.stripe.com/c/pay/{session_id}"));

        Ok(CheckoutSession {
            id: session_id,
            url,
            amount_total: Some(amount_total),
            customer_email: params.customer_email.map(str::to_string),
            customer_details: None,
            payment_status: Some("unpaid".to_string()),
        })
    }

    async fn resolve_session(&self, session_id: &str) -> Result<ResolvedSession, ResolverError> {
        let mut state = self.state.lock().await;
        state.resolve_calls += 1;

        match state.resolve_faults.get(session_id) {
            Some(ResolveFault::NotFound) => {
                return Err(ResolverError::NotFound(format!("No such checkout.session: {session_id}")));
            }
            Some(ResolveFault::Unavailable) => {
                return Err(ResolverError::Transient("connection reset".to_string()));
            }
            None => {}
        }

        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(format!("No such checkout.session: {session_id}")))
    }
}
