//! Per-product feed metadata.
//!
//! Metadata is stored as string key/value pairs next to each product. This
//! module owns both directions of that boundary:
//!
//! - [`fields`] - the declarative rule table applied on every write
//! - [`product`] - the typed [`ProductMeta`] view read by the feed builder
//!
//! Keys are the constants in [`keys`].

pub mod fields;
mod product;

use std::fmt;
use std::str::FromStr;

pub use fields::{
    sanitize, sanitize_attribute_map, sanitize_extra_images, sanitize_field, FieldSpec,
    MetaChanges, MetaError, ProductForm, Rule, PRODUCT_FIELDS,
};
pub use product::ProductMeta;

/// Maximum number of extra image links kept per product.
pub const MAX_EXTRA_IMAGES: usize = 10;

/// Stored metadata keys.
pub mod keys {
    pub const BRAND: &str = "brand";
    pub const GTIN: &str = "gtin";
    pub const MPN: &str = "mpn";
    pub const CONDITION: &str = "condition";
    pub const DESCRIPTION: &str = "description";
    pub const PREORDER: &str = "preorder";
    pub const AVAILABILITY_DATE: &str = "availability_date";
    pub const MULTIPACK: &str = "multipack";
    pub const MULTIPACK_QUANTITY: &str = "multipack_quantity";
    pub const BUNDLE: &str = "bundle";
    pub const ADULT: &str = "adult";
    pub const GOOGLE_PRODUCT_CATEGORY: &str = "google_product_category";
    /// JSON array of URLs.
    pub const EXTRA_IMAGES: &str = "extra_images";
    /// JSON object of Google attribute → catalog attribute name.
    pub const ATTRIBUTE_MAP: &str = "attribute_map";
}

/// The fixed vocabulary of Google attributes a catalog attribute can be
/// mapped onto. Variants are declared in feed output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GoogleAttribute {
    AgeGroup,
    Color,
    Gender,
    Material,
    Pattern,
    Size,
}

impl GoogleAttribute {
    pub const ALL: [GoogleAttribute; 6] = [
        Self::AgeGroup,
        Self::Color,
        Self::Gender,
        Self::Material,
        Self::Pattern,
        Self::Size,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgeGroup => "age_group",
            Self::Color => "color",
            Self::Gender => "gender",
            Self::Material => "material",
            Self::Pattern => "pattern",
            Self::Size => "size",
        }
    }

    /// Element name in the feed (`g:color`, ...).
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::AgeGroup => "g:age_group",
            Self::Color => "g:color",
            Self::Gender => "g:gender",
            Self::Material => "g:material",
            Self::Pattern => "g:pattern",
            Self::Size => "g:size",
        }
    }
}

impl FromStr for GoogleAttribute {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|a| a.as_str() == s).ok_or(())
    }
}

impl fmt::Display for GoogleAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
