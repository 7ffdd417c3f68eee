//! Declarative sanitisation rules for the metadata write path.
//!
//! Every scalar field is described once in [`PRODUCT_FIELDS`] by a
//! [`FieldSpec`]; writes from the admin form, the CLI and catalog imports
//! all go through [`sanitize`] so a value is only ever stored in its
//! cleaned form. Values rejected by their rule are treated as "not set".
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::{keys, GoogleAttribute, MAX_EXTRA_IMAGES};
use crate::util::{sanitize_text_field, sanitize_textarea_field, validate_public_url};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("Unknown product field '{0}'")]
    UnknownField(String),

    #[error("Value '{value}' is not valid for {key}")]
    Rejected { key: String, value: String },

    #[error("Field {key} expects JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Rule Table
// ============================================================================

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("digits pattern is valid"));

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

static ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]+$").expect("alphanumeric pattern is valid"));

/// How a submitted value is cleaned before storage.
#[derive(Debug)]
pub enum Rule {
    /// Single-line text: tags stripped, whitespace collapsed.
    Text,
    /// Multi-line text: tags stripped, line breaks kept.
    TextArea,
    /// ASCII digits only.
    Number,
    /// Exact member of a fixed set.
    OneOf(&'static [&'static str]),
    /// Calendar date in `YYYY-MM-DD`.
    IsoDate,
    /// Whole value must match the pattern.
    Pattern(&'static LazyLock<Regex>),
}

#[derive(Debug)]
pub struct FieldSpec {
    pub key: &'static str,
    pub rule: Rule,
    /// Applied before the rule, in characters.
    pub max_len: Option<usize>,
}

const YES_NO: &[&str] = &["yes", "no"];

pub static PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec { key: keys::BRAND, rule: Rule::Text, max_len: None },
    FieldSpec { key: keys::GTIN, rule: Rule::Number, max_len: Some(50) },
    FieldSpec { key: keys::MPN, rule: Rule::Pattern(&ALPHANUMERIC), max_len: Some(70) },
    FieldSpec { key: keys::CONDITION, rule: Rule::OneOf(&["new", "used", "refurbished"]), max_len: None },
    FieldSpec { key: keys::DESCRIPTION, rule: Rule::TextArea, max_len: Some(5000) },
    FieldSpec { key: keys::MULTIPACK, rule: Rule::OneOf(YES_NO), max_len: None },
    FieldSpec { key: keys::MULTIPACK_QUANTITY, rule: Rule::Number, max_len: None },
    FieldSpec { key: keys::BUNDLE, rule: Rule::OneOf(YES_NO), max_len: None },
    FieldSpec { key: keys::ADULT, rule: Rule::OneOf(YES_NO), max_len: None },
    FieldSpec { key: keys::GOOGLE_PRODUCT_CATEGORY, rule: Rule::Text, max_len: Some(500) },
    FieldSpec { key: keys::PREORDER, rule: Rule::OneOf(&["preorder", "yes"]), max_len: None },
    FieldSpec { key: keys::AVAILABILITY_DATE, rule: Rule::IsoDate, max_len: None },
];

pub fn field_spec(key: &str) -> Option<&'static FieldSpec> {
    PRODUCT_FIELDS.iter().find(|spec| spec.key == key)
}

/// Applies a rule to a raw value. `None` means the value is rejected or
/// empty and should not be stored.
pub fn sanitize(rule: &Rule, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let cleaned = match rule {
        Rule::Text => sanitize_text_field(value),
        Rule::TextArea => sanitize_textarea_field(value),
        Rule::Number => DIGITS.is_match(value).then(|| value.to_string())?,
        Rule::OneOf(allowed) => allowed.contains(&value).then(|| value.to_string())?,
        Rule::IsoDate => {
            if !ISO_DATE.is_match(value) {
                return None;
            }
            NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
            value.to_string()
        }
        Rule::Pattern(pattern) => pattern.is_match(value).then(|| value.to_string())?,
    };
    (!cleaned.is_empty()).then_some(cleaned)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn apply_spec(spec: &FieldSpec, raw: &str) -> Option<String> {
    let bounded = match spec.max_len {
        Some(max) => truncate_chars(raw, max),
        None => raw,
    };
    sanitize(&spec.rule, bounded)
}

/// Cleans extra image URLs: blanks and non-public URLs are dropped, and
/// only the first [`MAX_EXTRA_IMAGES`] survivors are kept, in order.
pub fn sanitize_extra_images<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter_map(|url| {
            let url = url.as_ref().trim();
            if url.is_empty() {
                return None;
            }
            match validate_public_url(url) {
                Ok(parsed) => Some(parsed.to_string()),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Dropping invalid extra image URL");
                    None
                }
            }
        })
        .take(MAX_EXTRA_IMAGES)
        .collect()
}

/// Cleans an attribute map: keys outside Google's vocabulary are dropped,
/// catalog attribute names are sanitised as text, blanks are dropped.
pub fn sanitize_attribute_map<I, K, V>(pairs: I) -> BTreeMap<GoogleAttribute, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .filter_map(|(google, catalog)| {
            let Ok(attr) = google.as_ref().parse::<GoogleAttribute>() else {
                tracing::warn!(attribute = %google.as_ref(), "Dropping unsupported Google attribute");
                return None;
            };
            let name = sanitize_text_field(catalog.as_ref());
            (!name.is_empty()).then_some((attr, name))
        })
        .collect()
}

pub(crate) fn encode_extra_images(urls: &[String]) -> String {
    serde_json::Value::from(urls.to_vec()).to_string()
}

pub(crate) fn encode_attribute_map(map: &BTreeMap<GoogleAttribute, String>) -> String {
    let object: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(attr, name)| (attr.as_str().to_string(), serde_json::Value::from(name.as_str())))
        .collect();
    serde_json::Value::Object(object).to_string()
}

/// Sanitises a single field for storage.
///
/// `extra_images` expects a JSON array and `attribute_map` a JSON object;
/// every other key goes through its [`FieldSpec`]. Returns `Ok(None)` for
/// an empty value (meaning "delete"), and [`MetaError::Rejected`] for a
/// non-empty value its rule refuses.
pub fn sanitize_field(key: &str, raw: &str) -> Result<Option<String>, MetaError> {
    let json_error = |source| MetaError::Json {
        key: key.to_string(),
        source,
    };

    match key {
        keys::EXTRA_IMAGES => {
            if raw.trim().is_empty() {
                return Ok(None);
            }
            let urls: Vec<String> = serde_json::from_str(raw).map_err(json_error)?;
            let cleaned = sanitize_extra_images(&urls);
            Ok((!cleaned.is_empty()).then(|| encode_extra_images(&cleaned)))
        }
        keys::ATTRIBUTE_MAP => {
            if raw.trim().is_empty() {
                return Ok(None);
            }
            let pairs: HashMap<String, String> = serde_json::from_str(raw).map_err(json_error)?;
            let cleaned = sanitize_attribute_map(pairs);
            Ok((!cleaned.is_empty()).then(|| encode_attribute_map(&cleaned)))
        }
        _ => {
            let spec = field_spec(key).ok_or_else(|| MetaError::UnknownField(key.to_string()))?;
            if raw.trim().is_empty() {
                return Ok(None);
            }
            apply_spec(spec, raw).map(Some).ok_or_else(|| MetaError::Rejected {
                key: key.to_string(),
                value: raw.to_string(),
            })
        }
    }
}

// ============================================================================
// Form Submission
// ============================================================================

/// A full submission of the product metadata form.
///
/// Scalar fields missing from `fields` are deleted, mirroring an HTML form
/// where an unchecked box or cleared input is simply not posted. The
/// structured lists are only touched when present.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ProductForm {
    pub fields: HashMap<String, String>,
    pub attribute_map: Option<HashMap<String, String>>,
    pub extra_images: Option<Vec<String>>,
}

/// Writes to apply for one product.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MetaChanges {
    pub set: Vec<(String, String)>,
    pub delete: Vec<String>,
}

impl ProductForm {
    pub fn into_changes(self) -> MetaChanges {
        let mut changes = MetaChanges::default();

        for spec in PRODUCT_FIELDS {
            let cleaned = self.fields.get(spec.key).and_then(|raw| {
                let cleaned = apply_spec(spec, raw);
                if cleaned.is_none() && !raw.trim().is_empty() {
                    tracing::warn!(field = spec.key, value = %raw, "Rejected product field value");
                }
                cleaned
            });
            match cleaned {
                Some(value) => changes.set.push((spec.key.to_string(), value)),
                None => changes.delete.push(spec.key.to_string()),
            }
        }

        for key in self.fields.keys() {
            if field_spec(key).is_none() {
                tracing::debug!(field = %key, "Ignoring unknown form field");
            }
        }

        if let Some(map) = self.attribute_map {
            let cleaned = sanitize_attribute_map(map);
            if cleaned.is_empty() {
                changes.delete.push(keys::ATTRIBUTE_MAP.to_string());
            } else {
                changes
                    .set
                    .push((keys::ATTRIBUTE_MAP.to_string(), encode_attribute_map(&cleaned)));
            }
        }

        if let Some(urls) = self.extra_images {
            let cleaned = sanitize_extra_images(&urls);
            if cleaned.is_empty() {
                changes.delete.push(keys::EXTRA_IMAGES.to_string());
            } else {
                changes
                    .set
                    .push((keys::EXTRA_IMAGES.to_string(), encode_extra_images(&cleaned)));
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_rule() {
        assert_eq!(sanitize(&Rule::Number, "0123456789"), Some("0123456789".into()));
        assert_eq!(sanitize(&Rule::Number, "12-34"), None);
        assert_eq!(sanitize(&Rule::Number, ""), None);
    }

    #[test]
    fn test_one_of_is_exact() {
        let rule = Rule::OneOf(&["new", "used"]);
        assert_eq!(sanitize(&rule, "used"), Some("used".into()));
        assert_eq!(sanitize(&rule, "Used"), None);
        assert_eq!(sanitize(&rule, "mint"), None);
    }

    #[test]
    fn test_iso_date_rule_checks_calendar() {
        assert_eq!(sanitize(&Rule::IsoDate, "2026-03-01"), Some("2026-03-01".into()));
        assert_eq!(sanitize(&Rule::IsoDate, "2026-02-30"), None);
        assert_eq!(sanitize(&Rule::IsoDate, "01/03/2026"), None);
    }

    #[test]
    fn test_mpn_pattern() {
        assert_eq!(sanitize_field(keys::MPN, "AB12cd").unwrap(), Some("AB12cd".into()));
        assert!(matches!(
            sanitize_field(keys::MPN, "AB-12"),
            Err(MetaError::Rejected { .. })
        ));
    }

    #[test]
    fn test_max_len_applied_before_rule() {
        let long_gtin = "1".repeat(60);
        let stored = sanitize_field(keys::GTIN, &long_gtin).unwrap().unwrap();
        assert_eq!(stored.len(), 50);

        let long_category = "é".repeat(600);
        let stored = sanitize_field(keys::GOOGLE_PRODUCT_CATEGORY, &long_category)
            .unwrap()
            .unwrap();
        assert_eq!(stored.chars().count(), 500);
    }

    #[test]
    fn test_text_rule_strips_tags() {
        assert_eq!(
            sanitize_field(keys::BRAND, " <em>Acme</em>  Co ").unwrap(),
            Some("Acme Co".into())
        );
    }

    #[test]
    fn test_empty_value_means_delete() {
        assert_eq!(sanitize_field(keys::BRAND, "   ").unwrap(), None);
        assert_eq!(sanitize_field(keys::EXTRA_IMAGES, "").unwrap(), None);
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            sanitize_field("colour", "red"),
            Err(MetaError::UnknownField(_))
        ));
    }

    #[test]
    fn test_extra_images_filtered_and_capped() {
        let mut urls: Vec<String> = (0..12)
            .map(|i| format!("https://cdn.example.com/{i}.jpg"))
            .collect();
        urls.insert(1, String::new());
        urls.insert(2, "http://localhost/x.jpg".to_string());

        let cleaned = sanitize_extra_images(&urls);
        assert_eq!(cleaned.len(), MAX_EXTRA_IMAGES);
        assert_eq!(cleaned[0], "https://cdn.example.com/0.jpg");
        assert_eq!(cleaned[1], "https://cdn.example.com/1.jpg");
        assert_eq!(cleaned[9], "https://cdn.example.com/9.jpg");
    }

    #[test]
    fn test_extra_images_field_json() {
        let stored = sanitize_field(
            keys::EXTRA_IMAGES,
            r#"["https://cdn.example.com/a.jpg", ""]"#,
        )
        .unwrap();
        assert_eq!(stored.as_deref(), Some(r#"["https://cdn.example.com/a.jpg"]"#));

        assert!(matches!(
            sanitize_field(keys::EXTRA_IMAGES, "not json"),
            Err(MetaError::Json { .. })
        ));
    }

    #[test]
    fn test_attribute_map_drops_unsupported_keys() {
        let map = sanitize_attribute_map([
            ("color", "pa_color"),
            ("flavour", "pa_flavour"),
            ("size", "  "),
            ("material", "<b>fabric</b>"),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&GoogleAttribute::Color], "pa_color");
        assert_eq!(map[&GoogleAttribute::Material], "fabric");
    }

    #[test]
    fn test_attribute_map_field_round_trip() {
        let stored = sanitize_field(keys::ATTRIBUTE_MAP, r#"{"size":"pa_size","color":"pa_color"}"#)
            .unwrap()
            .unwrap();
        // Canonical attribute order, not submission order.
        assert_eq!(stored, r#"{"color":"pa_color","size":"pa_size"}"#);
    }

    #[test]
    fn test_form_deletes_absent_and_rejected_fields() {
        let form = ProductForm {
            fields: HashMap::from([
                (keys::BRAND.to_string(), "Acme".to_string()),
                (keys::GTIN.to_string(), "not-a-number".to_string()),
                (keys::CONDITION.to_string(), "used".to_string()),
            ]),
            attribute_map: None,
            extra_images: None,
        };
        let changes = form.into_changes();

        assert_eq!(
            changes.set,
            vec![
                (keys::BRAND.to_string(), "Acme".to_string()),
                (keys::CONDITION.to_string(), "used".to_string()),
            ]
        );
        assert!(changes.delete.contains(&keys::GTIN.to_string()));
        assert!(changes.delete.contains(&keys::MPN.to_string()));
        assert_eq!(changes.delete.len(), PRODUCT_FIELDS.len() - 2);
    }

    #[test]
    fn test_form_structured_fields_only_when_present() {
        let form = ProductForm {
            fields: HashMap::new(),
            attribute_map: Some(HashMap::from([("color".to_string(), "pa_color".to_string())])),
            extra_images: Some(vec![]),
        };
        let changes = form.into_changes();
        assert!(changes
            .set
            .contains(&(keys::ATTRIBUTE_MAP.to_string(), r#"{"color":"pa_color"}"#.to_string())));
        assert!(changes.delete.contains(&keys::EXTRA_IMAGES.to_string()));
        assert!(!changes.set.iter().any(|(key, _)| key == keys::EXTRA_IMAGES));
    }

    #[test]
    fn test_form_lists_cleaned_to_nothing_are_deleted() {
        let form = ProductForm {
            fields: HashMap::new(),
            attribute_map: Some(HashMap::from([("colour".to_string(), "pa_colour".to_string())])),
            extra_images: Some(vec!["  ".to_string(), "http://127.0.0.1/x.jpg".to_string()]),
        };
        let changes = form.into_changes();
        assert!(changes.delete.contains(&keys::ATTRIBUTE_MAP.to_string()));
        assert!(changes.delete.contains(&keys::EXTRA_IMAGES.to_string()));
        assert!(changes.set.is_empty());
    }

    #[test]
    fn test_form_deserializes_from_json() {
        let form: ProductForm = serde_json::from_str(
            r#"{"fields": {"brand": "Acme"}, "extra_images": ["https://cdn.example.com/a.jpg"]}"#,
        )
        .unwrap();
        assert_eq!(form.fields.get("brand").map(String::as_str), Some("Acme"));
        assert!(form.attribute_map.is_none());
        assert_eq!(form.extra_images.as_ref().map(Vec::len), Some(1));
    }
}
