//! Stripe webhook route handler.
//!
//! # Response policy
//!
//! - Authentication failure: 400, nothing processed
//! - Event ignored, reconciled, or its session unknown at Stripe: 200
//! - Resolution or reconciliation failure: 500, so Stripe redelivers. The
//!   rollback leaves nothing behind and reconciliation is idempotent, so a
//!   redelivery is always safe.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Header carrying Stripe's signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /webhook`
///
/// The body is taken as raw bytes: signatures are computed over the exact
/// payload, so it must not pass through a JSON extractor first.
#[instrument(skip_all, fields(body_len = body.len()))]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let event = state.authenticator().authenticate(&body, signature)?;

    add_breadcrumb(
        "webhook",
        "Stripe event received",
        Some(&[
            ("event_type", event.kind.event_type()),
            ("event_id", event.id.as_deref().unwrap_or("-")),
        ]),
    );

    // Run to completion even if the client disconnects mid-request.
    let processor = state.webhooks().clone();
    let outcome = tokio::spawn(async move { processor.process(event).await })
        .await
        .map_err(|e| AppError::Internal(format!("webhook task failed: {e}")))??;

    debug!(?outcome, "Webhook processed");
    Ok(Json(json!({ "received": true })))
}
