//! Seed the product catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - id: 7
//!     name: Rose Bouquet
//!     description: A dozen long-stemmed red roses
//!     image_url: /images/rose-bouquet.jpg
//!     price_in_paise: 49900
//!     stock: 12
//! ```
//!
//! Rows are upserted by id, so re-running the command overwrites names,
//! prices and stock with the file's values. `active` defaults to true.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use fresh_blooms_storefront::db::{self, ProductRepository};
use fresh_blooms_storefront::models::Product;

use super::{CommandError, database_url};

/// Contents of a catalog file.
#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub products: Vec<Product>,
}

/// Seed products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or the database write fails. Validation happens before connecting.
pub async fn run(file_path: &str) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading catalog from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_string(),
            source,
        })?;
    let catalog: Catalog = serde_yaml::from_str(&content)?;
    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::Catalog(format!(
            "{} validation errors found",
            errors.len()
        )));
    }

    let pool = db::create_pool(&database_url()?, 2).await?;
    info!("Connected to database");

    let written = ProductRepository::new(&pool)
        .upsert_all(&catalog.products)
        .await?;
    info!(written, "Catalog seeded");

    Ok(())
}

/// Every problem with the catalog, empty if it can be written.
fn validate(catalog: &Catalog) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    if catalog.products.is_empty() {
        errors.push("catalog has no products".to_string());
    }

    for product in &catalog.products {
        if !seen.insert(product.id) {
            errors.push(format!("duplicate product id {}", product.id));
        }
        if product.name.trim().is_empty() {
            errors.push(format!("product {} has no name", product.id));
        }
        if product.price_in_paise.is_negative() {
            errors.push(format!("product {} has a negative price", product.id));
        }
        if product.stock < 0 {
            errors.push(format!("product {} has negative stock", product.id));
        }
    }

    errors
}
