//! Session resolution: turn a checkout session id into the authoritative
//! list of what was bought.

use thiserror::Error;
use tracing::{debug, instrument, warn};

use fresh_blooms_core::{Paise, ProductId};

use crate::models::{ResolvedLineItem, ResolvedSession};
use crate::stripe::types::{CheckoutSession, Expandable, LineItem};
use crate::stripe::{StripeClient, StripeError};

/// Product metadata key carrying the catalog product id.
pub const PRODUCT_ID_METADATA_KEY: &str = "product_id";

/// Errors from resolving a session.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The session does not exist upstream. Retrying will not help.
    #[error("checkout session not found: {0}")]
    NotFound(String),

    /// Network failure, timeout, rate limit or provider outage.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider answered with something unusable.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ResolverError {
    /// Whether a redelivery of the same event could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

impl From<StripeError> for ResolverError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::NotFound(message) => Self::NotFound(message),
            err if err.is_transient() => Self::Transient(err.to_string()),
            err => Self::Provider(err.to_string()),
        }
    }
}

/// Fetch a session and every page of its line items.
///
/// # Errors
///
/// Returns `ResolverError::NotFound` for an unknown session,
/// `ResolverError::Transient` for retryable failures, and
/// `ResolverError::Provider` for responses that cannot be used.
#[instrument(skip(client))]
pub async fn resolve_session(
    client: &StripeClient,
    session_id: &str,
) -> Result<ResolvedSession, ResolverError> {
    let session = client.retrieve_checkout_session(session_id).await?;

    let mut line_items = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = client
            .list_line_items(session_id, cursor.as_deref())
            .await?;
        let fetched = page.data.len();
        for item in page.data {
            line_items.push(resolve_line_item(item)?);
        }
        debug!(fetched, has_more = page.has_more, "Fetched line item page");

        if !page.has_more || fetched == 0 {
            break;
        }
        cursor = line_items.last().map(|item| item.line_item_id.clone());
    }

    Ok(resolved_session(session, line_items))
}

/// Combine a session with its line items.
#[must_use]
pub fn resolved_session(session: CheckoutSession, line_items: Vec<ResolvedLineItem>) -> ResolvedSession {
    let customer_email = session.email().map(str::to_owned);
    if session.payment_status.as_deref().is_some_and(|status| status != "paid") {
        warn!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Resolved session is not marked paid"
        );
    }

    ResolvedSession {
        amount_total: Paise::new(session.amount_total.unwrap_or_default()),
        session_id: session.id,
        customer_email,
        line_items,
    }
}

/// Extract quantity, unit amount, names and catalog linkage from a line.
///
/// # Errors
///
/// Returns `ResolverError::Provider` when the line has no usable quantity
/// or unit amount.
pub fn resolve_line_item(item: LineItem) -> Result<ResolvedLineItem, ResolverError> {
    let quantity = item
        .quantity
        .and_then(|q| u32::try_from(q).ok())
        .filter(|q| *q > 0)
        .ok_or_else(|| {
            ResolverError::Provider(format!("line item {} has no positive quantity", item.id))
        })?;

    let unit_amount = item
        .price
        .as_ref()
        .and_then(|price| price.unit_amount)
        .or_else(|| {
            item.amount_subtotal
                .map(|subtotal| subtotal / i64::from(quantity))
        })
        .ok_or_else(|| ResolverError::Provider(format!("line item {} has no unit amount", item.id)))?;

    let product = item
        .price
        .as_ref()
        .and_then(|price| price.product.as_ref())
        .and_then(Expandable::as_object);

    let product_id = product.and_then(|product| {
        let raw = product.metadata.get(PRODUCT_ID_METADATA_KEY)?;
        match raw.parse::<ProductId>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    line_item = %item.id,
                    metadata = %raw,
                    error = %e,
                    "Ignoring unparseable product_id metadata"
                );
                None
            }
        }
    });

    Ok(ResolvedLineItem {
        product_name: product.and_then(|product| product.name.clone()),
        product_id,
        line_item_id: item.id,
        quantity,
        unit_amount: Paise::new(unit_amount),
        description: item.description,
    })
}
