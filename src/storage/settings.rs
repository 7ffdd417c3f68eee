use anyhow::Result;

use super::schema::Database;
use crate::settings::{SettingKey, Settings};

impl Database {
    // ========================================================================
    // Settings Operations
    // ========================================================================

    /// Reads the settings snapshot used for one feed run.
    ///
    /// Keys that were never stored keep their defaults.
    pub async fn load_settings(&self) -> Result<Settings> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(Settings::from_pairs(rows))
    }

    /// Validates and stores one setting (UPSERT). A value that normalises
    /// to nothing clears the setting.
    ///
    /// Returns the stored value.
    ///
    /// # Errors
    ///
    /// [`SettingsError`](crate::settings::SettingsError) for an unknown key
    /// or a value outside the allowed vocabulary; nothing is written.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<String> {
        let key: SettingKey = key.parse()?;
        let normalized = key.normalize(value)?;

        if normalized.is_empty() {
            sqlx::query("DELETE FROM settings WHERE key = ?")
                .bind(key.as_str())
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at)
                VALUES (?, ?, datetime('now'))
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            )
            .bind(key.as_str())
            .bind(&normalized)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(key = key.as_str(), value = %normalized, "Updated setting");
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use crate::settings::{Availability, Condition, Settings, SettingsError};
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_yields_defaults() {
        let db = test_db().await;
        assert_eq!(db.load_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_set_and_load() {
        let db = test_db().await;
        assert_eq!(
            db.set_setting("default_availability", "In Stock").await.unwrap(),
            "in stock"
        );
        db.set_setting("default_condition", "refurbished").await.unwrap();
        db.set_setting("default_brand", "Acme").await.unwrap();
        db.set_setting("filter_by_category", "yes").await.unwrap();
        db.set_setting("included_categories", "shirts, ,kitchen").await.unwrap();

        let settings = db.load_settings().await.unwrap();
        assert_eq!(settings.default_availability, Availability::InStock);
        assert_eq!(settings.default_condition, Condition::Refurbished);
        assert_eq!(settings.default_brand.as_deref(), Some("Acme"));
        assert_eq!(
            settings.category_filter(),
            Some(&["shirts".to_string(), "kitchen".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_upsert_and_clear() {
        let db = test_db().await;
        db.set_setting("default_brand", "Acme").await.unwrap();
        db.set_setting("default_brand", "Globex").await.unwrap();
        assert_eq!(
            db.load_settings().await.unwrap().default_brand.as_deref(),
            Some("Globex")
        );

        assert_eq!(db.set_setting("default_brand", "  ").await.unwrap(), "");
        assert_eq!(db.load_settings().await.unwrap().default_brand, None);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let db = test_db().await;
        db.set_setting("default_condition", "used").await.unwrap();

        let err = db.set_setting("default_condition", "broken").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettingsError>(),
            Some(SettingsError::InvalidValue { key: "default_condition", .. })
        ));
        assert_eq!(
            db.load_settings().await.unwrap().default_condition,
            Condition::Used
        );

        let err = db.set_setting("theme", "dark").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<SettingsError>(),
            Some(&SettingsError::UnknownKey("theme".into()))
        );
    }

    #[tokio::test]
    async fn test_corrupt_stored_value_reads_as_default() {
        let db = test_db().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES ('default_availability', 'sometimes')")
            .execute(&db.pool)
            .await
            .unwrap();
        assert_eq!(
            db.load_settings().await.unwrap().default_availability,
            Availability::OutOfStock
        );
    }
}
