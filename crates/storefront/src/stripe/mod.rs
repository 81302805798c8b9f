//! Stripe REST API client.
//!
//! # Architecture
//!
//! - Form-encoded requests via `reqwest`, authenticated with the secret key
//! - One shared `reqwest::Client` with a per-request timeout
//! - Responses are read as text first so failures can be logged with the body
//!
//! # Endpoints
//!
//! - `POST /v1/checkout/sessions` - create a hosted checkout session
//! - `GET /v1/checkout/sessions/{id}` - retrieve a session
//! - `GET /v1/checkout/sessions/{id}/line_items` - list purchased lines

mod client;
pub mod types;

pub use client::{CheckoutSessionParams, StripeClient};

use thiserror::Error;

/// Errors that can occur when calling the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Stripe answered 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Stripe.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success answer.
    #[error("Stripe API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Stripe's error message, or a truncated body.
        message: String,
    },

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StripeError {
    /// Whether the same call might succeed later.
    ///
    /// Transport failures (including timeouts), rate limiting and 5xx answers
    /// are transient; rejected requests and unreadable bodies are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Parse(_) | Self::NotFound(_) | Self::InvalidRequest(_) => false,
        }
    }
}
