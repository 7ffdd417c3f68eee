use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

use crate::meta::ProductMeta;

/// Whether a product is sold as-is or through its variations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    Simple,
    Variable,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Variable => "variable",
        }
    }
}

/// Stock tracking for a product or variation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stock {
    /// Quantity is tracked; `None` means the quantity was never recorded.
    Managed { quantity: Option<i64> },
    /// Only a status flag is kept (e.g. `instock`, `outofstock`).
    Status(String),
}

/// Regular/sale price pair with an optional sale window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pricing {
    pub regular: Option<Decimal>,
    pub sale: Option<Decimal>,
    pub sale_from: Option<DateTime<FixedOffset>>,
    pub sale_to: Option<DateTime<FixedOffset>>,
}

impl Pricing {
    pub fn is_empty(&self) -> bool {
        self.regular.is_none() && self.sale.is_none()
    }

    /// A sale applies when a sale price undercuts a regular price and `now`
    /// lies inside the sale window. Missing window bounds are open.
    pub fn is_on_sale(&self, now: DateTime<FixedOffset>) -> bool {
        self.regular.is_some() && self.sale_active(now)
    }

    /// The price a customer pays at `now`. A lone sale price is the price
    /// while its window is open.
    pub fn current(&self, now: DateTime<FixedOffset>) -> Option<Decimal> {
        if self.sale_active(now) {
            self.sale
        } else {
            self.regular
        }
    }

    fn sale_active(&self, now: DateTime<FixedOffset>) -> bool {
        let Some(sale) = self.sale else {
            return false;
        };
        if matches!(self.regular, Some(regular) if sale >= regular) {
            return false;
        }
        if matches!(self.sale_from, Some(from) if now < from) {
            return false;
        }
        if matches!(self.sale_to, Some(to) if now > to) {
            return false;
        }
        true
    }

    /// Both bounds of the sale window, when fully specified.
    pub fn sale_window(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        Some((self.sale_from?, self.sale_to?))
    }
}

/// A purchasable configuration of a variable product.
#[derive(Debug, Clone, PartialEq)]
pub struct Variation {
    pub id: i64,
    /// Catalog attribute name → value, in the order the catalog lists them.
    pub attributes: Vec<(String, String)>,
    /// `None` inherits the parent's prices.
    pub pricing: Option<Pricing>,
    /// `None` inherits the parent's stock.
    pub stock: Option<Stock>,
    /// `None` inherits the parent's image.
    pub image_id: Option<i64>,
}

impl Variation {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub kind: ProductKind,
    pub title: String,
    pub permalink: String,
    pub short_description: String,
    pub pricing: Pricing,
    pub stock: Stock,
    pub image_id: Option<i64>,
    pub categories: Vec<String>,
    pub meta: ProductMeta,
    /// Available variations, empty for simple products.
    pub variations: Vec<Variation>,
}

impl Product {
    /// Every attribute name used by any of the product's variations.
    pub fn variation_attribute_names(&self) -> BTreeSet<&str> {
        self.variations
            .iter()
            .flat_map(|v| v.attributes.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    pub fn pricing_for<'a>(&'a self, variation: Option<&'a Variation>) -> &'a Pricing {
        variation
            .and_then(|v| v.pricing.as_ref())
            .unwrap_or(&self.pricing)
    }

    pub fn stock_for<'a>(&'a self, variation: Option<&'a Variation>) -> &'a Stock {
        variation
            .and_then(|v| v.stock.as_ref())
            .unwrap_or(&self.stock)
    }

    pub fn image_for(&self, variation: Option<&Variation>) -> Option<i64> {
        variation.and_then(|v| v.image_id).or(self.image_id)
    }
}

/// Named renditions of uploaded images (`full`, `thumbnail`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLibrary {
    renditions: HashMap<i64, HashMap<String, String>>,
}

impl ImageLibrary {
    pub const FULL_SIZE: &'static str = "full";

    pub fn insert(&mut self, image_id: i64, size: impl Into<String>, url: impl Into<String>) {
        self.renditions
            .entry(image_id)
            .or_default()
            .insert(size.into(), url.into());
    }

    /// URL of the requested rendition, falling back to the full-size image.
    pub fn resolve(&self, image_id: i64, size: &str) -> Option<&str> {
        let sizes = self.renditions.get(&image_id)?;
        sizes
            .get(size)
            .or_else(|| sizes.get(Self::FULL_SIZE))
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }

    pub fn len(&self) -> usize {
        self.renditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renditions.is_empty()
    }
}

/// The published products selected for one feed generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub products: Vec<Product>,
    pub images: ImageLibrary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_not_on_sale_without_sale_price() {
        let pricing = Pricing {
            regular: Some(dec("10.00")),
            ..Default::default()
        };
        let now = at("2026-06-01T00:00:00+00:00");
        assert!(!pricing.is_on_sale(now));
        assert_eq!(pricing.current(now), Some(dec("10.00")));
    }

    #[test]
    fn test_on_sale_inside_window() {
        let pricing = Pricing {
            regular: Some(dec("10.00")),
            sale: Some(dec("7.50")),
            sale_from: Some(at("2026-05-01T00:00:00+00:00")),
            sale_to: Some(at("2026-07-01T00:00:00+00:00")),
        };
        assert!(pricing.is_on_sale(at("2026-06-01T00:00:00+00:00")));
        assert!(!pricing.is_on_sale(at("2026-04-30T23:59:59+00:00")));
        assert!(!pricing.is_on_sale(at("2026-07-01T00:00:01+00:00")));
        assert_eq!(
            pricing.current(at("2026-06-01T00:00:00+00:00")),
            Some(dec("7.50"))
        );
    }

    #[test]
    fn test_sale_price_must_undercut_regular() {
        let pricing = Pricing {
            regular: Some(dec("10.00")),
            sale: Some(dec("10.00")),
            ..Default::default()
        };
        assert!(!pricing.is_on_sale(at("2026-06-01T00:00:00+00:00")));
    }

    #[test]
    fn test_lone_sale_price_is_not_a_sale() {
        let pricing = Pricing {
            sale: Some(dec("9.99")),
            sale_to: Some(at("2026-07-01T00:00:00+00:00")),
            ..Default::default()
        };
        let now = at("2026-06-01T00:00:00+00:00");
        assert!(!pricing.is_on_sale(now));
        assert_eq!(pricing.current(now), Some(dec("9.99")));
        assert_eq!(pricing.current(at("2026-07-02T00:00:00+00:00")), None);
    }

    #[test]
    fn test_sale_window_needs_both_bounds() {
        let mut pricing = Pricing {
            sale: Some(dec("5")),
            sale_from: Some(at("2026-05-01T00:00:00+02:00")),
            ..Default::default()
        };
        assert!(pricing.sale_window().is_none());
        pricing.sale_to = Some(at("2026-05-31T00:00:00+02:00"));
        assert!(pricing.sale_window().is_some());
    }

    #[test]
    fn test_variation_inherits_parent_fields() {
        let variation = Variation {
            id: 2,
            attributes: vec![("pa_color".into(), "red".into())],
            pricing: None,
            stock: Some(Stock::Managed { quantity: Some(3) }),
            image_id: None,
        };
        let product = Product {
            id: 1,
            kind: ProductKind::Variable,
            title: "Shirt".into(),
            permalink: "https://shop.example.com/shirt".into(),
            short_description: String::new(),
            pricing: Pricing {
                regular: Some(dec("20")),
                ..Default::default()
            },
            stock: Stock::Status("outofstock".into()),
            image_id: Some(9),
            categories: vec![],
            meta: ProductMeta::default(),
            variations: vec![variation.clone()],
        };

        assert_eq!(product.pricing_for(Some(&variation)).regular, Some(dec("20")));
        assert_eq!(
            product.stock_for(Some(&variation)),
            &Stock::Managed { quantity: Some(3) }
        );
        assert_eq!(product.image_for(Some(&variation)), Some(9));
        assert_eq!(variation.attribute("pa_color"), Some("red"));
        assert_eq!(variation.attribute("pa_size"), None);
        assert_eq!(
            product.variation_attribute_names().into_iter().collect::<Vec<_>>(),
            vec!["pa_color"]
        );
    }

    #[test]
    fn test_image_library_fallback_to_full() {
        let mut images = ImageLibrary::default();
        images.insert(1, "full", "https://cdn.example.com/1.jpg");
        images.insert(1, "thumb", "https://cdn.example.com/1-150.jpg");
        images.insert(2, "full", "https://cdn.example.com/2.jpg");

        assert_eq!(images.resolve(1, "thumb"), Some("https://cdn.example.com/1-150.jpg"));
        assert_eq!(images.resolve(2, "thumb"), Some("https://cdn.example.com/2.jpg"));
        assert_eq!(images.resolve(3, "thumb"), None);
    }
}
