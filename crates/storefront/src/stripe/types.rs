//! Wire types for the Stripe REST API.
//!
//! Only the fields the storefront reads are modelled. Everything Stripe may
//! omit or null out is an `Option`.

use std::collections::HashMap;

use serde::Deserialize;

/// A page of a Stripe list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

/// `checkout.session` object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page; only present while the session is open.
    pub url: Option<String>,
    pub amount_total: Option<i64>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub payment_status: Option<String>,
}

impl CheckoutSession {
    /// The email the customer paid with, falling back to the one supplied at
    /// session creation.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|details| details.email.as_deref())
            .or(self.customer_email.as_deref())
            .filter(|email| !email.trim().is_empty())
    }
}

/// Customer details collected on the payment page.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

/// `item` object from `GET /v1/checkout/sessions/{id}/line_items`.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub description: Option<String>,
    pub quantity: Option<u64>,
    pub amount_subtotal: Option<i64>,
    pub price: Option<Price>,
}

/// `price` object.
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub unit_amount: Option<i64>,
    pub product: Option<Expandable<Product>>,
}

/// `product` object.
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A field Stripe returns either as an id or, when requested with
/// `expand[]`, as the full object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

impl<T> Expandable<T> {
    /// The expanded object, if Stripe sent one.
    #[must_use]
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Self::Object(object) => Some(object),
            Self::Id(_) => None,
        }
    }
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Details of a Stripe API error.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}
