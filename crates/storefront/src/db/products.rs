//! Product catalog repository.

use sqlx::PgPool;

use super::RepositoryError;
use crate::models::Product;

/// Repository for catalog reads and seeding.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every active product, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(
            r"
            SELECT id, name, description, image_url, price_in_paise, stock, active
            FROM products
            WHERE active
            ORDER BY id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Insert or overwrite catalog rows by id, then move the id sequence past
    /// the highest id so later inserts without an id do not collide.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a negative stock value.
    /// Returns `RepositoryError::Database` if any statement fails; no row is
    /// written in that case.
    pub async fn upsert_all(&self, products: &[Product]) -> Result<usize, RepositoryError> {
        if let Some(product) = products.iter().find(|p| p.stock < 0) {
            return Err(RepositoryError::Conflict(format!(
                "product {} has negative stock {}",
                product.id, product.stock
            )));
        }

        let mut tx = self.pool.begin().await?;

        for product in products {
            sqlx::query(
                r"
                INSERT INTO products (id, name, description, image_url, price_in_paise, stock, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE
                   SET name = EXCLUDED.name,
                       description = EXCLUDED.description,
                       image_url = EXCLUDED.image_url,
                       price_in_paise = EXCLUDED.price_in_paise,
                       stock = EXCLUDED.stock,
                       active = EXCLUDED.active
                ",
            )
            .bind(product.id)
            .bind(&product.name)
            .bind(product.description.as_deref())
            .bind(product.image_url.as_deref())
            .bind(product.price_in_paise)
            .bind(product.stock)
            .bind(product.active)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
            SELECT setval(
                pg_get_serial_sequence('products', 'id'),
                GREATEST((SELECT MAX(id) FROM products), 1)
            )
            ",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(products.len())
    }
}
