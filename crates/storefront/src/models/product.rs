//! Catalog products.

use serde::{Deserialize, Serialize};

use fresh_blooms_core::{Paise, ProductId};

/// A catalog product as served by `GET /api/products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price_in_paise: Paise,
    /// Units on hand. Never negative.
    pub stock: i32,
    /// Inactive products stay referenceable by old orders but are not listed.
    #[serde(skip_serializing, default = "active_default")]
    pub active: bool,
}

const fn active_default() -> bool {
    true
}
