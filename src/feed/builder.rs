use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};

use super::entry::{EntryMapper, FeedEntry};
use crate::catalog::{Catalog, Product, ProductKind, Variation};
use crate::settings::Settings;

/// Site-level values for one generation run.
#[derive(Debug, Clone)]
pub struct FeedContext {
    pub site_title: String,
    pub site_url: String,
    /// Image rendition published as `g:image_link`.
    pub image_size: String,
    /// ISO 4217 code appended to prices, if configured.
    pub currency: Option<String>,
    /// Feed `<updated>` time, also the reference time for sale windows.
    pub generated_at: DateTime<FixedOffset>,
}

/// A generated feed, ready to serialise.
#[derive(Debug, Clone)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub updated: DateTime<FixedOffset>,
    pub entries: Vec<FeedEntry>,
}

/// Catalog attribute names used by variations but not mapped onto a
/// Google attribute.
pub fn unmapped_attributes(product: &Product) -> BTreeSet<&str> {
    let mapped: BTreeSet<&str> = product
        .meta
        .attribute_map
        .values()
        .map(String::as_str)
        .collect();
    product
        .variation_attribute_names()
        .into_iter()
        .filter(|name| !mapped.contains(name))
        .collect()
}

/// Variations can share an item group only when every attribute that
/// distinguishes them is published as a Google attribute.
pub fn item_group_id(product: &Product) -> Option<i64> {
    unmapped_attributes(product).is_empty().then_some(product.id)
}

/// Appends the Google attributes mapped for this product, read from the
/// variation's own attribute values.
fn append_mapped_attributes(entry: &mut FeedEntry, product: &Product, variation: &Variation) {
    for (google, catalog_name) in &product.meta.attribute_map {
        match variation.attribute(catalog_name) {
            Some(value) if !value.trim().is_empty() => entry.push(google.element_name(), value),
            Some(_) => {}
            None => {
                tracing::warn!(
                    product_id = product.id,
                    variation_id = variation.id,
                    attribute = %catalog_name,
                    google_attribute = %google,
                    "Could not resolve mapped attribute on variation, skipping it"
                );
            }
        }
    }
}

fn variation_entries(mapper: &EntryMapper<'_>, product: &Product) -> Vec<FeedEntry> {
    let group_id = item_group_id(product);
    if group_id.is_none() {
        tracing::debug!(
            product_id = product.id,
            unmapped = ?unmapped_attributes(product),
            "Variations have unmapped attributes, omitting item_group_id"
        );
    }

    product
        .variations
        .iter()
        .map(|variation| {
            let mut entry = mapper.map(product, Some(variation));
            entry.push("g:id", variation.id.to_string());
            if let Some(group_id) = group_id {
                entry.push("g:item_group_id", group_id.to_string());
            }
            append_mapped_attributes(&mut entry, product, variation);
            entry
        })
        .collect()
}

/// Maps the catalog onto feed entries.
///
/// Simple products come first, one entry each; then every variable
/// product contributes one entry per available variation.
pub fn build_feed(ctx: &FeedContext, settings: &Settings, catalog: &Catalog) -> Feed {
    let mapper = EntryMapper::new(ctx, settings, &catalog.images);
    let mut entries = Vec::new();

    for product in catalog
        .products
        .iter()
        .filter(|p| p.kind == ProductKind::Simple)
    {
        let mut entry = mapper.map(product, None);
        entry.push("g:id", product.id.to_string());
        entries.push(entry);
    }

    for product in catalog
        .products
        .iter()
        .filter(|p| p.kind == ProductKind::Variable)
    {
        entries.extend(variation_entries(&mapper, product));
    }

    tracing::info!(
        products = catalog.products.len(),
        entries = entries.len(),
        "Built product feed"
    );

    Feed {
        title: ctx.site_title.clone(),
        link: ctx.site_url.clone(),
        updated: ctx.generated_at,
        entries,
    }
}
