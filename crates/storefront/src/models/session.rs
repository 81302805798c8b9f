//! Provider-side view of a completed checkout.

use fresh_blooms_core::{Paise, ProductId};

/// A checkout session as reported by the payment provider, with every page
/// of its line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session_id: String,
    /// Amount actually charged. Zero when the provider omits it.
    pub amount_total: Paise,
    pub customer_email: Option<String>,
    pub line_items: Vec<ResolvedLineItem>,
}

/// One purchased line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLineItem {
    /// Provider line item id, stable across redeliveries.
    pub line_item_id: String,
    /// At least one.
    pub quantity: u32,
    pub unit_amount: Paise,
    /// Line description shown at checkout.
    pub description: Option<String>,
    /// Name of the provider-side product.
    pub product_name: Option<String>,
    /// Catalog product recovered from the provider product's metadata.
    pub product_id: Option<ProductId>,
}

impl ResolvedLineItem {
    /// The name the provider shows for this line, skipping blank values.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        [self.description.as_deref(), self.product_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }
}
