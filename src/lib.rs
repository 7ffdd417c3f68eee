//! Google Merchant Center product feed generator.
//!
//! Catalog data is imported from JSON snapshots into a local SQLite store,
//! enriched with per-product feed metadata, and rendered as an Atom
//! document with the `g:` namespace.

pub mod catalog;
pub mod config;
pub mod feed;
pub mod meta;
pub mod settings;
pub mod storage;
pub mod util;
