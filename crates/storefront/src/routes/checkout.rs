//! Checkout route handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::services::CheckoutRequest;
use crate::state::AppState;

/// Response body of `POST /api/create-checkout-session`.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted Stripe checkout page.
    pub url: String,
}

/// `POST /api/create-checkout-session`
///
/// Accepts `{ items: [{ id, name, price_in_paise, qty }], customer_email }`
/// and answers `{ url }` for the browser to redirect to.
pub async fn create_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let created = state
        .checkout()
        .create_session(&request.items, request.customer_email.as_deref())
        .await?;

    Ok(Json(CheckoutResponse { url: created.url }))
}
