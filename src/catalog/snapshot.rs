//! JSON catalog snapshots exported from the shop platform.
//!
//! A snapshot is the only way catalog data enters the local store:
//!
//! ```json
//! {
//!   "products": [{
//!     "id": 10, "type": "variable", "title": "Tee",
//!     "permalink": "https://shop.example.com/tee",
//!     "regular_price": "20.00", "manage_stock": false, "stock_status": "instock",
//!     "categories": ["shirts"],
//!     "meta": { "brand": "Acme", "attribute_map": { "color": "pa_color" } },
//!     "variations": [{ "id": 11, "attributes": { "pa_color": "red" } }]
//!   }],
//!   "images": [{ "id": 3, "sizes": { "full": "https://cdn.example.com/3.jpg" } }]
//! }
//! ```
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use super::types::ProductKind;

/// Snapshots above this size are refused before parsing.
const MAX_SNAPSHOT_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),

    #[error("Catalog file too large: {0} bytes")]
    TooLarge(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Simple,
    Variable,
}

impl From<SnapshotKind> for ProductKind {
    fn from(kind: SnapshotKind) -> Self {
        match kind {
            SnapshotKind::Simple => ProductKind::Simple,
            SnapshotKind::Variable => ProductKind::Variable,
        }
    }
}

fn default_status() -> String {
    "publish".to_string()
}

fn default_stock_status() -> String {
    "instock".to_string()
}

fn default_true() -> bool {
    true
}

/// Accepts `null`, `""`, a JSON number or a numeric string.
fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a price, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotProduct {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    #[serde(default = "default_status")]
    pub status: String,
    pub title: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub regular_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub date_on_sale_from: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub date_on_sale_to: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub manage_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default = "default_stock_status")]
    pub stock_status: String,
    #[serde(default)]
    pub image_id: Option<i64>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub variations: Vec<SnapshotVariation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotVariation {
    pub id: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Insertion order is preserved and drives the variation title.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub regular_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub date_on_sale_from: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub date_on_sale_to: Option<DateTime<FixedOffset>>,
    /// `None` inherits the parent's stock handling.
    #[serde(default)]
    pub manage_stock: Option<bool>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub stock_status: Option<String>,
    #[serde(default)]
    pub image_id: Option<i64>,
}

impl SnapshotVariation {
    /// Attribute values rendered as strings, in catalog order.
    pub fn attribute_pairs(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.clone(), scalar_to_string(value)))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotImage {
    pub id: i64,
    #[serde(default)]
    pub sizes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub products: Vec<SnapshotProduct>,
    #[serde(default)]
    pub images: Vec<SnapshotImage>,
}

/// Renders a JSON scalar the way it would appear in a form post.
fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(true) => "yes".to_string(),
        serde_json::Value::Bool(false) => "no".to_string(),
        other => other.to_string(),
    }
}

/// Renders a snapshot meta value as the raw string handed to the
/// sanitiser: scalars as text, lists and maps as JSON.
pub fn meta_value_to_raw(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => value.to_string(),
        scalar => scalar_to_string(scalar),
    }
}

impl CatalogSnapshot {
    /// Parses and structurally validates a snapshot.
    pub fn parse(content: &str) -> Result<Self, ImportError> {
        let snapshot: Self = serde_json::from_str(content)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), ImportError> {
        let mut seen = HashSet::new();
        for product in &self.products {
            if product.id <= 0 {
                return Err(ImportError::Invalid(format!(
                    "product id must be positive, got {}",
                    product.id
                )));
            }
            if !seen.insert(product.id) {
                return Err(ImportError::Invalid(format!(
                    "duplicate id {}",
                    product.id
                )));
            }
            if product.kind == SnapshotKind::Simple && !product.variations.is_empty() {
                return Err(ImportError::Invalid(format!(
                    "simple product {} has variations",
                    product.id
                )));
            }
            for variation in &product.variations {
                if variation.id <= 0 || !seen.insert(variation.id) {
                    return Err(ImportError::Invalid(format!(
                        "variation id {} of product {} is not a unique positive id",
                        variation.id, product.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn variation_count(&self) -> usize {
        self.products.iter().map(|p| p.variations.len()).sum()
    }
}

/// Reads and parses a snapshot file.
pub async fn read_snapshot(path: &Path) -> Result<CatalogSnapshot> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    if metadata.len() > MAX_SNAPSHOT_SIZE {
        return Err(ImportError::TooLarge(metadata.len()).into());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    let snapshot = CatalogSnapshot::parse(&content)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        products = snapshot.products.len(),
        variations = snapshot.variation_count(),
        images = snapshot.images.len(),
        "Read catalog snapshot"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_product() {
        let snapshot =
            CatalogSnapshot::parse(r#"{"products": [{"id": 1, "type": "simple", "title": "Mug"}]}"#)
                .unwrap();
        let p = &snapshot.products[0];
        assert_eq!(p.status, "publish");
        assert_eq!(p.stock_status, "instock");
        assert!(!p.manage_stock);
        assert!(p.regular_price.is_none());
        assert!(snapshot.images.is_empty());
    }

    #[test]
    fn test_prices_accept_strings_numbers_and_blanks() {
        let snapshot = CatalogSnapshot::parse(
            r#"{"products": [
                {"id": 1, "type": "simple", "title": "A", "regular_price": "19.90", "sale_price": ""},
                {"id": 2, "type": "simple", "title": "B", "regular_price": 5, "sale_price": null}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            snapshot.products[0].regular_price,
            Some(Decimal::from_str("19.90").unwrap())
        );
        assert_eq!(snapshot.products[0].sale_price, None);
        assert_eq!(snapshot.products[1].regular_price, Some(Decimal::from(5)));
    }

    #[test]
    fn test_bad_price_is_an_error() {
        let result = CatalogSnapshot::parse(
            r#"{"products": [{"id": 1, "type": "simple", "title": "A", "regular_price": "cheap"}]}"#,
        );
        assert!(matches!(result, Err(ImportError::Json(_))));
    }

    #[test]
    fn test_sale_window_parses_offsets() {
        let snapshot = CatalogSnapshot::parse(
            r#"{"products": [{"id": 1, "type": "simple", "title": "A",
                "date_on_sale_from": "2026-05-01T00:00:00+02:00",
                "date_on_sale_to": "2026-05-31T23:59:59+02:00"}]}"#,
        )
        .unwrap();
        let from = snapshot.products[0].date_on_sale_from.unwrap();
        assert_eq!(from.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn test_variation_attributes_keep_order() {
        let snapshot = CatalogSnapshot::parse(
            r#"{"products": [{"id": 1, "type": "variable", "title": "Tee", "variations": [
                {"id": 2, "attributes": {"pa_size": "xl", "pa_color": "red"}}
            ]}]}"#,
        )
        .unwrap();
        let variation = &snapshot.products[0].variations[0];
        assert!(variation.enabled);
        assert_eq!(
            variation.attribute_pairs(),
            vec![
                ("pa_size".to_string(), "xl".to_string()),
                ("pa_color".to_string(), "red".to_string()),
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = CatalogSnapshot::parse(
            r#"{"products": [{"id": 1, "type": "variable", "title": "Tee", "variations": [{"id": 1}]}]}"#,
        );
        assert!(matches!(result, Err(ImportError::Invalid(_))));
    }

    #[test]
    fn test_simple_product_with_variations_rejected() {
        let result = CatalogSnapshot::parse(
            r#"{"products": [{"id": 1, "type": "simple", "title": "Mug", "variations": [{"id": 2}]}]}"#,
        );
        assert!(matches!(result, Err(ImportError::Invalid(_))));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result =
            CatalogSnapshot::parse(r#"{"products": [{"id": 1, "type": "grouped", "title": "Set"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_meta_value_to_raw() {
        use serde_json::json;
        assert_eq!(meta_value_to_raw(&json!("Acme")), "Acme");
        assert_eq!(meta_value_to_raw(&json!(true)), "yes");
        assert_eq!(meta_value_to_raw(&json!(6)), "6");
        assert_eq!(meta_value_to_raw(&json!(["a", "b"])), r#"["a","b"]"#);
        assert_eq!(
            meta_value_to_raw(&json!({"color": "pa_color"})),
            r#"{"color":"pa_color"}"#
        );
    }
}
