//! Cart items submitted at checkout.
//!
//! The cart itself lives in the shopper's browser. The storefront only sees
//! it once, as the payload of the checkout request, so the type here is a
//! plain value with validation rather than a persisted entity.

use serde::{Deserialize, Deserializer, Serialize};

use super::id::ProductId;
use super::money::Paise;

/// Problems with a submitted cart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    /// The cart has no items.
    #[error("cart is empty")]
    Empty,
    /// An item has a quantity below one.
    #[error("item {product_id} has quantity 0")]
    ZeroQuantity {
        /// The offending product.
        product_id: ProductId,
    },
    /// An item has a negative unit price.
    #[error("item {product_id} has a negative price")]
    NegativePrice {
        /// The offending product.
        product_id: ProductId,
    },
    /// An item has a blank name (the provider requires one).
    #[error("item {product_id} has no name")]
    MissingName {
        /// The offending product.
        product_id: ProductId,
    },
    /// The cart total does not fit in an i64.
    #[error("cart total overflows")]
    Overflow,
}

/// One line of a shopper's cart.
///
/// The browser stores product ids as strings (they come from `data-id`
/// attributes), so `id` accepts either a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Internal product id.
    #[serde(deserialize_with = "product_id_from_number_or_string")]
    pub id: ProductId,
    /// Product name at the time it was added to the cart.
    pub name: String,
    /// Unit price snapshot in paise.
    pub price_in_paise: Paise,
    /// Quantity, at least one.
    pub qty: u32,
}

impl CartItem {
    /// Check the item can be sent to the payment provider.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] when the quantity is zero, the price is
    /// negative, or the name is blank.
    pub fn validate(&self) -> Result<(), CartError> {
        if self.qty == 0 {
            return Err(CartError::ZeroQuantity { product_id: self.id });
        }
        if self.price_in_paise.is_negative() {
            return Err(CartError::NegativePrice { product_id: self.id });
        }
        if self.name.trim().is_empty() {
            return Err(CartError::MissingName { product_id: self.id });
        }
        Ok(())
    }

    /// Unit price times quantity, `None` on overflow.
    #[must_use]
    pub fn line_total(&self) -> Option<Paise> {
        self.price_in_paise.checked_mul_qty(self.qty)
    }
}

/// Validate every item and sum the cart.
///
/// # Errors
///
/// Returns [`CartError::Empty`] for an empty slice, the first item's
/// validation error, or [`CartError::Overflow`].
pub fn cart_total(items: &[CartItem]) -> Result<Paise, CartError> {
    if items.is_empty() {
        return Err(CartError::Empty);
    }
    items.iter().try_fold(Paise::ZERO, |total, item| {
        item.validate()?;
        item.line_total()
            .and_then(|line| total.checked_add(line))
            .ok_or(CartError::Overflow)
    })
}

fn product_id_from_number_or_string<'de, D>(deserializer: D) -> Result<ProductId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) if n > 0 => Ok(ProductId::new(n)),
        Raw::Number(n) => Err(serde::de::Error::custom(format!(
            "product id must be positive, got {n}"
        ))),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rose(qty: u32) -> CartItem {
        CartItem {
            id: ProductId::new(7),
            name: "Rose Bouquet".to_string(),
            price_in_paise: Paise::new(49_900),
            qty,
        }
    }

    #[test]
    fn test_deserialize_numeric_and_string_ids() {
        let numeric: CartItem = serde_json::from_str(
            r#"{"id":7,"name":"Rose Bouquet","price_in_paise":49900,"qty":2}"#,
        )
        .unwrap();
        let textual: CartItem = serde_json::from_str(
            r#"{"id":"7","name":"Rose Bouquet","price_in_paise":49900,"qty":2}"#,
        )
        .unwrap();
        assert_eq!(numeric, rose(2));
        assert_eq!(textual, rose(2));
    }

    #[test]
    fn test_deserialize_rejects_bad_ids() {
        let zero = r#"{"id":0,"name":"x","price_in_paise":1,"qty":1}"#;
        let text = r#"{"id":"rose","name":"x","price_in_paise":1,"qty":1}"#;
        assert!(serde_json::from_str::<CartItem>(zero).is_err());
        assert!(serde_json::from_str::<CartItem>(text).is_err());
    }

    #[test]
    fn test_cart_total() {
        let tulip = CartItem {
            id: ProductId::new(3),
            name: "Tulips".to_string(),
            price_in_paise: Paise::new(19_900),
            qty: 1,
        };
        assert_eq!(cart_total(&[rose(2), tulip]), Ok(Paise::new(119_700)));
    }

    #[test]
    fn test_cart_total_rejects_invalid_items() {
        assert_eq!(cart_total(&[]), Err(CartError::Empty));
        assert_eq!(
            cart_total(&[rose(0)]),
            Err(CartError::ZeroQuantity {
                product_id: ProductId::new(7)
            })
        );

        let mut free = rose(1);
        free.price_in_paise = Paise::new(-1);
        assert!(matches!(
            cart_total(&[free]),
            Err(CartError::NegativePrice { .. })
        ));

        let mut nameless = rose(1);
        nameless.name = "  ".to_string();
        assert!(matches!(
            cart_total(&[nameless]),
            Err(CartError::MissingName { .. })
        ));
    }

    #[test]
    fn test_cart_total_overflow() {
        let mut huge = rose(2);
        huge.price_in_paise = Paise::new(i64::MAX);
        assert_eq!(cart_total(&[huge]), Err(CartError::Overflow));
    }
}
