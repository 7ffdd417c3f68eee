//! The shop catalog as seen by the feed builder.
//!
//! - [`types`] - in-memory products, variations, prices, stock and images
//! - [`snapshot`] - the JSON export format used to import catalog data

mod snapshot;
mod types;

pub use snapshot::{
    meta_value_to_raw, read_snapshot, CatalogSnapshot, ImportError, SnapshotImage,
    SnapshotKind, SnapshotProduct, SnapshotVariation,
};
pub use types::{Catalog, ImageLibrary, Pricing, Product, ProductKind, Stock, Variation};
