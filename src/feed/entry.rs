//! Maps one product (or one variation of it) onto the fields of a feed
//! entry.
//!
//! Everything here is a pure function of the product, the optional
//! variation, the settings snapshot and the feed context. Stock, price and
//! image come from the variation when it has its own; every piece of feed
//! metadata comes from the parent product.
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::builder::FeedContext;
use crate::catalog::{ImageLibrary, Pricing, Product, Stock, Variation};
use crate::meta::ProductMeta;
use crate::settings::{Availability, Settings};
use crate::util::{truncate_bytes, ucfirst};

/// Upper bound on the description payload, in bytes.
pub const MAX_DESCRIPTION_BYTES: usize = 4988;

/// `strftime` pattern for Atom timestamps (`2026-10-16T09:30:00+02:00`).
pub const ATOM_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Entity-escaped on output.
    Text(String),
    /// Written as literal character data.
    CData(String),
}

impl FieldValue {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::CData(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedField {
    /// Qualified element name, e.g. `g:price`.
    pub name: &'static str,
    pub value: FieldValue,
}

/// The ordered fields of one `<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    fields: Vec<FeedField>,
}

impl FeedEntry {
    pub fn push(&mut self, name: &'static str, value: impl Into<String>) {
        self.fields.push(FeedField {
            name,
            value: FieldValue::Text(value.into()),
        });
    }

    pub fn push_cdata(&mut self, name: &'static str, value: impl Into<String>) {
        self.fields.push(FeedField {
            name,
            value: FieldValue::CData(value.into()),
        });
    }

    pub fn fields(&self) -> &[FeedField] {
        &self.fields
    }

    /// First value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All values of the named field, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .map(|f| f.value.as_str())
            .collect()
    }
}

/// Availability of an item, plus the date it ships for preorders.
pub fn availability(
    meta: &ProductMeta,
    stock: &Stock,
    settings: &Settings,
) -> (Availability, Option<NaiveDate>) {
    if meta.preorder {
        return (Availability::Preorder, meta.availability_date);
    }
    let availability = match stock {
        Stock::Managed { quantity: None } => settings.default_availability,
        Stock::Managed { quantity: Some(q) } if *q > 0 => Availability::InStock,
        Stock::Managed { .. } => Availability::OutOfStock,
        Stock::Status(status) if status.eq_ignore_ascii_case("instock") => Availability::InStock,
        Stock::Status(_) => Availability::OutOfStock,
    };
    (availability, None)
}

/// Title of a variation entry: `"Parent - Red, Xl"`.
pub fn variation_title(parent_title: &str, variation: &Variation) -> String {
    let values: Vec<_> = variation
        .attributes
        .iter()
        .map(|(_, value)| ucfirst(value))
        .collect();
    format!("{} - {}", parent_title, values.join(", "))
}

/// Builds entries for a single generation run.
pub struct EntryMapper<'a> {
    ctx: &'a FeedContext,
    settings: &'a Settings,
    images: &'a ImageLibrary,
}

impl<'a> EntryMapper<'a> {
    pub fn new(ctx: &'a FeedContext, settings: &'a Settings, images: &'a ImageLibrary) -> Self {
        Self {
            ctx,
            settings,
            images,
        }
    }

    /// Fills every entry field except `g:id`, `g:item_group_id` and mapped
    /// attributes, which the builder appends.
    pub fn map(&self, product: &Product, variation: Option<&Variation>) -> FeedEntry {
        let meta = &product.meta;
        let mut entry = FeedEntry::default();

        let title = match variation {
            Some(v) => variation_title(&product.title, v),
            None => product.title.clone(),
        };
        entry.push("g:title", title);
        entry.push("g:link", product.permalink.as_str());

        let condition = meta.condition.unwrap_or(self.settings.default_condition);
        entry.push("g:condition", condition.as_str());
        entry.push("g:adult", if meta.adult { "yes" } else { "no" });

        let description = meta
            .description
            .as_deref()
            .unwrap_or(&product.short_description);
        entry.push_cdata(
            "g:description",
            truncate_bytes(description, MAX_DESCRIPTION_BYTES),
        );

        self.push_price(&mut entry, product.pricing_for(variation), product.id);

        let (availability, available_on) =
            availability(meta, product.stock_for(variation), self.settings);
        entry.push("g:availability", availability.as_str());
        if let Some(date) = available_on {
            entry.push("g:availability_date", date.format("%Y-%m-%d").to_string());
        }

        self.push_identifiers(&mut entry, meta);

        if let Some(size) = meta.multipack_size() {
            entry.push("g:multipack", size.to_string());
        }
        if meta.bundle {
            entry.push("g:is_bundle", "yes");
        }
        if let Some(category) = &meta.google_product_category {
            entry.push("g:google_product_category", category.as_str());
        }

        if let Some(url) = product
            .image_for(variation)
            .and_then(|id| self.images.resolve(id, &self.ctx.image_size))
        {
            entry.push("g:image_link", url);
        }
        for url in meta.extra_images.iter().filter(|u| !u.trim().is_empty()) {
            entry.push("g:additional_image_link", url.as_str());
        }

        entry
    }

    fn format_price(&self, amount: Decimal) -> String {
        match &self.ctx.currency {
            Some(currency) => format!("{amount} {currency}"),
            None => amount.to_string(),
        }
    }

    fn push_price(&self, entry: &mut FeedEntry, pricing: &Pricing, product_id: i64) {
        let now = self.ctx.generated_at;
        if pricing.is_on_sale(now) {
            if let Some(regular) = pricing.regular {
                entry.push("g:price", self.format_price(regular));
            }
            if let Some(sale) = pricing.sale {
                entry.push("g:sale_price", self.format_price(sale));
            }
            if let Some((from, to)) = pricing.sale_window() {
                entry.push(
                    "g:sale_price_effective_date",
                    format!(
                        "{}/{}",
                        from.format(ATOM_DATE_FORMAT),
                        to.format(ATOM_DATE_FORMAT)
                    ),
                );
            }
        } else if let Some(price) = pricing.current(now) {
            entry.push("g:price", self.format_price(price));
        } else {
            tracing::debug!(product_id, "No price set, omitting g:price");
        }
    }

    fn push_identifiers(&self, entry: &mut FeedEntry, meta: &ProductMeta) {
        if let Some(gtin) = &meta.gtin {
            entry.push("g:gtin", gtin.as_str());
        }
        if let Some(mpn) = &meta.mpn {
            entry.push("g:mpn", mpn.as_str());
        }
        let brand = meta.brand.as_ref().or(self.settings.default_brand.as_ref());
        if let Some(brand) = brand {
            entry.push("g:brand", brand.as_str());
        }
        if meta.gtin.is_none() && (meta.mpn.is_none() || brand.is_none()) {
            entry.push("g:identifier_exists", "no");
        }
    }
}
