//! Product feed generation.
//!
//! Turns a loaded [`Catalog`](crate::catalog::Catalog) into a Google
//! Merchant Center Atom document:
//!
//! - [`builder`] - walks simple products, then variations of variable products
//! - [`entry`] - maps one product or variation onto its `g:` fields
//! - [`writer`] - serialises the feed with `quick-xml`
//! - [`shortcode`] - substitutes the document into page templates
//!
//! # Example
//!
//! ```ignore
//! let settings = db.load_settings().await?;
//! let catalog = db.load_catalog(&settings).await?;
//! let xml = feed::render(&config.feed_context(Local::now().fixed_offset()), &settings, &catalog)?;
//! ```

mod builder;
mod entry;
mod shortcode;
mod writer;

use std::path::Path;

use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::settings::Settings;

pub use builder::{build_feed, item_group_id, unmapped_attributes, Feed, FeedContext};
pub use entry::{
    availability, variation_title, EntryMapper, FeedEntry, FeedField, FieldValue,
    ATOM_DATE_FORMAT, MAX_DESCRIPTION_BYTES,
};
pub use shortcode::{contains_shortcode, expand_shortcodes, SHORTCODE};
pub use writer::{ATOM_NS, GOOGLE_NS};

/// Builds and serialises the feed in one step.
pub fn render(ctx: &FeedContext, settings: &Settings, catalog: &Catalog) -> Result<String> {
    build_feed(ctx, settings, catalog).to_xml()
}

/// Writes `content` to `path` without ever leaving a partial file behind.
///
/// The content goes to a uniquely named temporary file in the same
/// directory, is synced to disk, then renamed over the destination.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    // Unpredictable temp name; create_new refuses to follow a planted symlink.
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions",
                temp_path.display()
            )
        })?;

    file.write_all(content.as_bytes()).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to write feed to temporary file '{}'",
            temp_path.display()
        )
    })?;

    file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to sync temporary file '{}' to disk",
            temp_path.display()
        )
    })?;

    drop(file);

    #[cfg(windows)]
    if path.exists() {
        std::fs::remove_file(path).with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to remove existing '{}'", path.display())
        })?;
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })?;

    tracing::info!(path = %path.display(), bytes = content.len(), "Wrote feed");
    Ok(())
}
