//! Store-wide feed defaults.
//!
//! Settings are persisted as flat key/value pairs (see
//! [`Database::load_settings`](crate::storage::Database::load_settings)) and
//! read once per generation into an immutable [`Settings`] snapshot that is
//! passed explicitly to the feed builder. Stored values that no longer parse
//! fall back to their defaults; they are never surfaced as errors during
//! generation.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::util::sanitize_text_field;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: expected one of {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

// ============================================================================
// Vocabulary
// ============================================================================

/// Google's `availability` values that can be configured as a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    InStock,
    #[default]
    OutOfStock,
    Preorder,
}

impl Availability {
    pub const ALL: [Availability; 3] = [Self::InStock, Self::OutOfStock, Self::Preorder];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in stock",
            Self::OutOfStock => "out of stock",
            Self::Preorder => "preorder",
        }
    }
}

impl FromStr for Availability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Google's `condition` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    #[default]
    New,
    Used,
    Refurbished,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Self::New, Self::Used, Self::Refurbished];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Used => "used",
            Self::Refurbished => "refurbished",
        }
    }
}

impl FromStr for Condition {
    type Err = ();

    /// Case-insensitive: stored overrides are lower-cased before use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or(())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Recognised settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    DefaultAvailability,
    DefaultBrand,
    DefaultCondition,
    FilterByCategory,
    IncludedCategories,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        Self::DefaultAvailability,
        Self::DefaultBrand,
        Self::DefaultCondition,
        Self::FilterByCategory,
        Self::IncludedCategories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultAvailability => "default_availability",
            Self::DefaultBrand => "default_brand",
            Self::DefaultCondition => "default_condition",
            Self::FilterByCategory => "filter_by_category",
            Self::IncludedCategories => "included_categories",
        }
    }

    /// Validates and normalises a value before it is stored.
    ///
    /// An empty result means "clear this setting".
    pub fn normalize(&self, raw: &str) -> Result<String, SettingsError> {
        let invalid = |expected| SettingsError::InvalidValue {
            key: self.as_str(),
            value: raw.to_string(),
            expected,
        };
        match self {
            Self::DefaultAvailability => raw
                .parse::<Availability>()
                .map(|a| a.as_str().to_string())
                .map_err(|_| invalid("in stock, out of stock, preorder")),
            Self::DefaultCondition => raw
                .parse::<Condition>()
                .map(|c| c.as_str().to_string())
                .map_err(|_| invalid("new, used, refurbished")),
            Self::DefaultBrand => Ok(sanitize_text_field(raw)),
            Self::FilterByCategory => match raw.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "1" => Ok("yes".to_string()),
                "no" | "false" | "0" | "" => Ok("no".to_string()),
                _ => Err(invalid("yes, no")),
            },
            Self::IncludedCategories => Ok(split_list(raw).join(",")),
        }
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(sanitize_text_field)
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable defaults used by the entry mapper when a product has no
/// override of its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub default_availability: Availability,
    pub default_brand: Option<String>,
    pub default_condition: Condition,
    pub filter_by_category: bool,
    pub included_categories: Vec<String>,
}

impl Settings {
    /// Builds a snapshot from stored key/value pairs.
    ///
    /// Unknown keys and unparseable values are logged and ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Ok(parsed) = key.parse::<SettingKey>() else {
                tracing::warn!(key = %key, "Ignoring unknown stored setting");
                continue;
            };
            match parsed {
                SettingKey::DefaultAvailability => match value.parse() {
                    Ok(a) => settings.default_availability = a,
                    Err(()) => tracing::warn!(value = %value, "Stored default availability is invalid, using default"),
                },
                SettingKey::DefaultCondition => match value.parse() {
                    Ok(c) => settings.default_condition = c,
                    Err(()) => tracing::warn!(value = %value, "Stored default condition is invalid, using default"),
                },
                SettingKey::DefaultBrand => {
                    let brand = value.trim();
                    settings.default_brand = (!brand.is_empty()).then(|| brand.to_string());
                }
                SettingKey::FilterByCategory => settings.filter_by_category = value == "yes",
                SettingKey::IncludedCategories => settings.included_categories = split_list(value),
            }
        }
        settings
    }

    /// Category slugs to restrict the feed to, if filtering is enabled.
    ///
    /// Filtering with an empty include list yields `Some(&[])`, which
    /// selects no products.
    pub fn category_filter(&self) -> Option<&[String]> {
        self.filter_by_category
            .then_some(self.included_categories.as_slice())
    }

    /// Renders the snapshot back into `(key, value)` pairs for display.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                SettingKey::DefaultAvailability.as_str(),
                self.default_availability.to_string(),
            ),
            (
                SettingKey::DefaultBrand.as_str(),
                self.default_brand.clone().unwrap_or_default(),
            ),
            (
                SettingKey::DefaultCondition.as_str(),
                self.default_condition.to_string(),
            ),
            (
                SettingKey::FilterByCategory.as_str(),
                if self.filter_by_category { "yes" } else { "no" }.to_string(),
            ),
            (
                SettingKey::IncludedCategories.as_str(),
                self.included_categories.join(","),
            ),
        ]
    }
}
