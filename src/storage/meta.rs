use std::collections::HashMap;

use anyhow::Result;

use super::schema::Database;
use super::types::{DatabaseError, KIND_VARIATION};
use crate::meta::{sanitize_field, MetaChanges, ProductForm, ProductMeta};

impl Database {
    // ========================================================================
    // Product Metadata Operations
    // ========================================================================

    /// Whether `id` names a product (not a variation) in the catalog.
    pub async fn product_exists(&self, id: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT id FROM products WHERE id = ? AND kind != '{KIND_VARIATION}'"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn ensure_product(&self, id: i64) -> Result<()> {
        if !self.product_exists(id).await? {
            return Err(DatabaseError::ProductNotFound(id).into());
        }
        Ok(())
    }

    /// Stored metadata for a product as raw `(key, value)` pairs, ordered by key.
    pub async fn get_product_meta_raw(&self, id: i64) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM product_meta WHERE product_id = ? ORDER BY key")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    /// Typed metadata for a product. Unreadable values come back as absent.
    pub async fn get_product_meta(&self, id: i64) -> Result<ProductMeta> {
        let raw: HashMap<String, String> = self.get_product_meta_raw(id).await?.into_iter().collect();
        Ok(ProductMeta::from_raw(&raw))
    }

    /// Sanitises and stores a single metadata field.
    ///
    /// An empty value deletes the field. Returns the stored value.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::ProductNotFound`] for an unknown product, and
    /// [`MetaError`](crate::meta::MetaError) when the value is rejected.
    /// Nothing is written in either case.
    pub async fn set_product_meta(&self, id: i64, key: &str, value: &str) -> Result<Option<String>> {
        self.ensure_product(id).await?;
        let cleaned = sanitize_field(key, value)?;

        match &cleaned {
            Some(clean) => {
                sqlx::query(
                    r#"
                    INSERT INTO product_meta (product_id, key, value) VALUES (?, ?, ?)
                    ON CONFLICT(product_id, key) DO UPDATE SET value = excluded.value
                "#,
                )
                .bind(id)
                .bind(key)
                .bind(clean)
                .execute(&self.pool)
                .await?;
                tracing::debug!(product_id = id, key = %key, "Stored product metadata");
            }
            None => {
                sqlx::query("DELETE FROM product_meta WHERE product_id = ? AND key = ?")
                    .bind(id)
                    .bind(key)
                    .execute(&self.pool)
                    .await?;
                tracing::debug!(product_id = id, key = %key, "Deleted product metadata");
            }
        }

        Ok(cleaned)
    }

    /// Applies a full metadata form submission in one transaction.
    ///
    /// Fields missing from the form are deleted. Returns the writes made.
    pub async fn save_product_form(&self, id: i64, form: ProductForm) -> Result<MetaChanges> {
        self.ensure_product(id).await?;
        let changes = form.into_changes();

        let mut tx = self.pool.begin().await?;
        for (key, value) in &changes.set {
            sqlx::query(
                r#"
                INSERT INTO product_meta (product_id, key, value) VALUES (?, ?, ?)
                ON CONFLICT(product_id, key) DO UPDATE SET value = excluded.value
            "#,
            )
            .bind(id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        for key in &changes.delete {
            sqlx::query("DELETE FROM product_meta WHERE product_id = ? AND key = ?")
                .bind(id)
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            product_id = id,
            set = changes.set.len(),
            deleted = changes.delete.len(),
            "Saved product metadata form"
        );
        Ok(changes)
    }
}
