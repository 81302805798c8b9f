//! Stripe API client implementation.

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use fresh_blooms_core::CartItem;

use super::StripeError;
use super::types::{CheckoutSession, ErrorResponse, LineItem, List};
use crate::config::StripeConfig;

/// Line items requested per page. Stripe's maximum.
const LINE_ITEMS_PAGE_SIZE: &str = "100";

/// How much of an error body ends up in logs and error messages.
const BODY_EXCERPT_CHARS: usize = 200;

// =============================================================================
// CheckoutSessionParams
// =============================================================================

/// Parameters for `POST /v1/checkout/sessions`.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutSessionParams<'a> {
    pub items: &'a [CartItem],
    /// Lower-case ISO 4217 code applied to every line.
    pub currency: &'a str,
    pub customer_email: Option<&'a str>,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    /// Sent as the `Idempotency-Key` header.
    pub idempotency_key: &'a str,
}

impl CheckoutSessionParams<'_> {
    /// Encode as Stripe's bracketed form fields.
    ///
    /// Each line carries the catalog product id in its product metadata so
    /// reconciliation can link the purchased line back to the catalog.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.to_string()),
            ("cancel_url".to_string(), self.cancel_url.to_string()),
        ];
        if let Some(email) = self.customer_email {
            form.push(("customer_email".to_string(), email.to_string()));
        }

        for (index, item) in self.items.iter().enumerate() {
            let prefix = format!("line_items[{index}]");
            form.extend([
                (format!("{prefix}[quantity]"), item.qty.to_string()),
                (
                    format!("{prefix}[price_data][currency]"),
                    self.currency.to_string(),
                ),
                (
                    format!("{prefix}[price_data][unit_amount]"),
                    item.price_in_paise.as_i64().to_string(),
                ),
                (
                    format!("{prefix}[price_data][product_data][name]"),
                    item.name.trim().to_string(),
                ),
                (
                    format!("{prefix}[price_data][product_data][metadata][product_id]"),
                    item.id.to_string(),
                ),
            ]);
        }

        form
    }
}

// =============================================================================
// StripeClient
// =============================================================================

/// Client for the Stripe REST API.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: Url,
    secret_key: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.inner.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Http` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("fresh-blooms/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(StripeClientInner {
                client,
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
            }),
        })
    }

    /// Create a hosted checkout session.
    ///
    /// # Errors
    ///
    /// Returns `StripeError` if the request fails or Stripe rejects it.
    #[instrument(skip(self, params), fields(items = params.items.len()))]
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let url = self.endpoint(&["v1", "checkout", "sessions"])?;
        let request = self
            .inner
            .client
            .post(url)
            .header("Idempotency-Key", params.idempotency_key)
            .form(&params.to_form());

        self.send(request).await
    }

    /// Retrieve a checkout session by id.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::NotFound` for an unknown session, or another
    /// `StripeError` if the request fails.
    #[instrument(skip(self))]
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let url = self.endpoint(&["v1", "checkout", "sessions", session_id])?;
        self.send(self.inner.client.get(url)).await
    }

    /// Fetch one page of a session's line items with products expanded.
    ///
    /// # Errors
    ///
    /// Returns `StripeError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_line_items(
        &self,
        session_id: &str,
        starting_after: Option<&str>,
    ) -> Result<List<LineItem>, StripeError> {
        let url = self.endpoint(&["v1", "checkout", "sessions", session_id, "line_items"])?;

        let mut query = vec![
            ("limit", LINE_ITEMS_PAGE_SIZE),
            ("expand[]", "data.price.product"),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor));
        }

        self.send(self.inner.client.get(url).query(&query)).await
    }

    /// Build an API URL. Segments are percent-encoded individually, so an id
    /// can never change the path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StripeError> {
        let mut url = self.inner.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StripeError::InvalidRequest(format!(
                    "API base {} cannot have a path",
                    self.inner.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Authenticate, send and decode a request.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StripeError> {
        let response = request
            .basic_auth(self.inner.secret_key.expose_secret(), None::<&str>)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(StripeError::RateLimited(retry_after));
        }

        // Read as text first for better error diagnostics
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(StripeError::NotFound(error_message(&body)));
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %excerpt(&body),
                "Stripe API returned non-success status"
            );
            return Err(StripeError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse Stripe response"
            );
            StripeError::Parse(e)
        })
    }
}

/// Stripe's own error message if the body is an error envelope, otherwise a
/// truncated body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(response) => {
            debug!(
                kind = ?response.error.kind,
                code = ?response.error.code,
                "Stripe error envelope"
            );
            response
                .error
                .message
                .or(response.error.code)
                .unwrap_or_else(|| excerpt(body))
        }
        Err(_) => excerpt(body),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
