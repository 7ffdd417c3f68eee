use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use super::{keys, GoogleAttribute, MAX_EXTRA_IMAGES};
use crate::settings::Condition;

/// Typed view of a product's stored feed metadata.
///
/// Every field is optional. Blank values and values that fail to parse
/// are read as absent, so the feed builder never has to tell "not set"
/// apart from "set to something unusable".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductMeta {
    pub brand: Option<String>,
    pub gtin: Option<String>,
    pub mpn: Option<String>,
    pub condition: Option<Condition>,
    pub description: Option<String>,
    pub preorder: bool,
    pub availability_date: Option<NaiveDate>,
    pub multipack: bool,
    pub multipack_quantity: Option<u32>,
    pub bundle: bool,
    pub adult: bool,
    pub google_product_category: Option<String>,
    pub extra_images: Vec<String>,
    pub attribute_map: BTreeMap<GoogleAttribute, String>,
}

fn present(raw: &HashMap<String, String>, key: &str) -> Option<String> {
    raw.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn flag(raw: &HashMap<String, String>, key: &str) -> bool {
    matches!(present(raw, key).as_deref(), Some("yes" | "preorder"))
}

impl ProductMeta {
    /// Reads metadata from stored key/value pairs.
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        let condition = present(raw, keys::CONDITION).and_then(|c| c.parse().ok());

        let availability_date = present(raw, keys::AVAILABILITY_DATE)
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

        let multipack_quantity = present(raw, keys::MULTIPACK_QUANTITY).and_then(|q| q.parse().ok());

        let extra_images = present(raw, keys::EXTRA_IMAGES)
            .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok())
            .unwrap_or_default()
            .into_iter()
            .filter(|url| !url.trim().is_empty())
            .take(MAX_EXTRA_IMAGES)
            .collect();

        let attribute_map = present(raw, keys::ATTRIBUTE_MAP)
            .and_then(|json| serde_json::from_str::<HashMap<String, String>>(&json).ok())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(google, catalog)| {
                let attr = google.parse::<GoogleAttribute>().ok()?;
                (!catalog.trim().is_empty()).then_some((attr, catalog))
            })
            .collect();

        Self {
            brand: present(raw, keys::BRAND),
            gtin: present(raw, keys::GTIN),
            mpn: present(raw, keys::MPN),
            condition,
            description: present(raw, keys::DESCRIPTION),
            preorder: flag(raw, keys::PREORDER),
            availability_date,
            multipack: flag(raw, keys::MULTIPACK),
            multipack_quantity,
            bundle: flag(raw, keys::BUNDLE),
            adult: flag(raw, keys::ADULT),
            google_product_category: present(raw, keys::GOOGLE_PRODUCT_CATEGORY),
            extra_images,
            attribute_map,
        }
    }

    /// Pack size to publish, if this is a multipack of at least two items.
    pub fn multipack_size(&self) -> Option<u32> {
        if !self.multipack {
            return None;
        }
        self.multipack_quantity.filter(|&q| q >= 2)
    }
}
