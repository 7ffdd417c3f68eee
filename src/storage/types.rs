use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::catalog::{Pricing, Stock};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the catalog database
    #[error("The catalog database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Metadata write addressed a product that is not in the catalog
    #[error("Product {0} not found")]
    ProductNotFound(i64),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Import Report
// ============================================================================

/// Counts from one catalog import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub products: usize,
    pub variations: usize,
    pub images: usize,
    pub meta_fields: usize,
    /// Metadata values refused by the sanitiser and not stored.
    pub rejected_meta: usize,
}

// ============================================================================
// Row Types
// ============================================================================

/// Kind column values.
pub(crate) const KIND_SIMPLE: &str = "simple";
pub(crate) const KIND_VARIABLE: &str = "variable";
pub(crate) const KIND_VARIATION: &str = "variation";

/// Row of the `products` table, shared by products and variations.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    pub id: i64,
    pub kind: String,
    pub parent_id: Option<i64>,
    pub title: String,
    pub permalink: String,
    pub short_description: String,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    pub sale_from: Option<String>,
    pub sale_to: Option<String>,
    pub manage_stock: Option<bool>,
    pub stock_quantity: Option<i64>,
    pub stock_status: Option<String>,
    pub image_id: Option<i64>,
}

/// Column list matching [`ProductRow`].
pub(crate) const PRODUCT_COLUMNS: &str = "id, kind, parent_id, title, permalink, short_description, \
     regular_price, sale_price, sale_from, sale_to, manage_stock, stock_quantity, stock_status, image_id";

fn parse_price(id: i64, column: &str, raw: Option<&str>) -> Option<Decimal> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match Decimal::from_str(raw) {
        Ok(price) => Some(price),
        Err(e) => {
            tracing::warn!(product_id = id, column, value = %raw, error = %e, "Unreadable stored price, ignoring it");
            None
        }
    }
}

fn parse_time(id: i64, column: &str, raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => Some(time),
        Err(e) => {
            tracing::warn!(product_id = id, column, value = %raw, error = %e, "Unreadable stored date, ignoring it");
            None
        }
    }
}

impl ProductRow {
    pub fn pricing(&self) -> Pricing {
        Pricing {
            regular: parse_price(self.id, "regular_price", self.regular_price.as_deref()),
            sale: parse_price(self.id, "sale_price", self.sale_price.as_deref()),
            sale_from: parse_time(self.id, "sale_from", self.sale_from.as_deref()),
            sale_to: parse_time(self.id, "sale_to", self.sale_to.as_deref()),
        }
    }

    /// Variations without prices of their own inherit the parent's.
    pub fn own_pricing(&self) -> Option<Pricing> {
        let pricing = self.pricing();
        (!pricing.is_empty()).then_some(pricing)
    }

    pub fn stock(&self) -> Stock {
        self.own_stock()
            .unwrap_or_else(|| Stock::Status("instock".to_string()))
    }

    /// `None` when neither stock management nor a status was recorded.
    pub fn own_stock(&self) -> Option<Stock> {
        match (self.manage_stock, self.stock_status.as_deref()) {
            (Some(true), _) => Some(Stock::Managed {
                quantity: self.stock_quantity,
            }),
            (Some(false), status) => Some(Stock::Status(status.unwrap_or("instock").to_string())),
            (None, Some(status)) => Some(Stock::Status(status.to_string())),
            (None, None) => None,
        }
    }
}
