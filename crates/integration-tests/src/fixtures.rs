//! Test data builders.

use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;

use fresh_blooms_core::{CartItem, Paise, ProductId};
use fresh_blooms_storefront::models::{Product, ResolvedLineItem, ResolvedSession};
use fresh_blooms_storefront::services::{AuthError, signature_header};

/// Signing secret used by every signed test delivery.
pub const WEBHOOK_SECRET: &str = "whsec_test_9d8c7b6a5f4e3d2c1b0a";

/// Storage timeout for engines under test.
pub const STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Buyer email used by fixtures.
pub const BUYER_EMAIL: &str = "asha@example.in";

#[must_use]
pub fn webhook_secret() -> SecretString {
    SecretString::from(WEBHOOK_SECRET)
}

#[must_use]
pub fn product(id: i32, name: &str, price_in_paise: i64, stock: i32) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: None,
        image_url: None,
        price_in_paise: Paise::new(price_in_paise),
        stock,
        active: true,
    }
}

/// The starter catalog: Sunflower Bunch (1), Tulip Mix (3), Rose Bouquet (7).
#[must_use]
pub fn catalog() -> Vec<Product> {
    vec![
        product(1, "Sunflower Bunch", 29_900, 25),
        product(3, "Tulip Mix", 19_900, 30),
        product(7, "Rose Bouquet", 49_900, 12),
    ]
}

#[must_use]
pub fn cart_item(id: i32, name: &str, price_in_paise: i64, qty: u32) -> CartItem {
    CartItem {
        id: ProductId::new(id),
        name: name.to_string(),
        price_in_paise: Paise::new(price_in_paise),
        qty,
    }
}

/// A line linked to catalog product `product_id`.
#[must_use]
pub fn linked_line(line_item_id: &str, product_id: i32, name: &str, unit: i64, qty: u32) -> ResolvedLineItem {
    ResolvedLineItem {
        line_item_id: line_item_id.to_string(),
        quantity: qty,
        unit_amount: Paise::new(unit),
        description: Some(name.to_string()),
        product_name: Some(name.to_string()),
        product_id: Some(ProductId::new(product_id)),
    }
}

/// A line whose provider product carries no catalog id.
#[must_use]
pub fn unlinked_line(line_item_id: &str, name: Option<&str>, unit: i64, qty: u32) -> ResolvedLineItem {
    ResolvedLineItem {
        line_item_id: line_item_id.to_string(),
        quantity: qty,
        unit_amount: Paise::new(unit),
        description: name.map(str::to_string),
        product_name: None,
        product_id: None,
    }
}

/// A paid session whose total is the sum of its lines.
#[must_use]
pub fn paid_session(session_id: &str, line_items: Vec<ResolvedLineItem>) -> ResolvedSession {
    let total = line_items
        .iter()
        .map(|line| line.unit_amount.as_i64() * i64::from(line.quantity))
        .sum();
    ResolvedSession {
        session_id: session_id.to_string(),
        amount_total: Paise::new(total),
        customer_email: Some(BUYER_EMAIL.to_string()),
        line_items,
    }
}

/// Body of a `checkout.session.completed` delivery.
#[must_use]
pub fn completed_event(session_id: &str) -> Vec<u8> {
    json!({
        "id": format!("evt_{session_id}"),
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "amount_total": 99_800,
                "customer_email": BUYER_EMAIL,
                "payment_status": "paid"
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Body of an event the storefront does not act on.
#[must_use]
pub fn event_of_type(event_type: &str) -> Vec<u8> {
    json!({
        "id": "evt_other_1",
        "object": "event",
        "type": event_type,
        "data": { "object": { "id": "pi_3Nq" } }
    })
    .to_string()
    .into_bytes()
}

/// `Stripe-Signature` for `body`, signed now with [`WEBHOOK_SECRET`].
///
/// # Errors
///
/// Returns `AuthError` if the secret cannot key an HMAC.
pub fn sign(body: &[u8]) -> Result<String, AuthError> {
    signature_header(&webhook_secret(), Utc::now().timestamp(), body)
}
