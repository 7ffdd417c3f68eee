use std::collections::HashMap;

use anyhow::Result;
use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{
    ImportReport, ProductRow, KIND_SIMPLE, KIND_VARIABLE, KIND_VARIATION, PRODUCT_COLUMNS,
};
use crate::catalog::{
    meta_value_to_raw, Catalog, CatalogSnapshot, ImageLibrary, Product, ProductKind,
    SnapshotProduct, SnapshotVariation, Variation,
};
use crate::meta::{sanitize_field, ProductMeta};
use crate::settings::Settings;

/// Rows per multi-row INSERT (3 columns each, well under SQLite's bind limit).
const INSERT_CHUNK: usize = 100;

/// Column values written for a product or variation row.
struct ProductRecord<'a> {
    id: i64,
    kind: &'static str,
    parent_id: Option<i64>,
    status: &'a str,
    enabled: bool,
    title: &'a str,
    permalink: &'a str,
    short_description: &'a str,
    regular_price: Option<String>,
    sale_price: Option<String>,
    sale_from: Option<String>,
    sale_to: Option<String>,
    manage_stock: Option<bool>,
    stock_quantity: Option<i64>,
    stock_status: Option<&'a str>,
    image_id: Option<i64>,
    menu_order: i64,
}

impl<'a> ProductRecord<'a> {
    fn from_product(product: &'a SnapshotProduct, menu_order: i64) -> Self {
        Self {
            id: product.id,
            kind: match ProductKind::from(product.kind) {
                ProductKind::Simple => KIND_SIMPLE,
                ProductKind::Variable => KIND_VARIABLE,
            },
            parent_id: None,
            status: &product.status,
            enabled: true,
            title: &product.title,
            permalink: &product.permalink,
            short_description: &product.short_description,
            regular_price: product.regular_price.map(|p| p.to_string()),
            sale_price: product.sale_price.map(|p| p.to_string()),
            sale_from: product.date_on_sale_from.map(|d| d.to_rfc3339()),
            sale_to: product.date_on_sale_to.map(|d| d.to_rfc3339()),
            manage_stock: Some(product.manage_stock),
            stock_quantity: product.stock_quantity,
            stock_status: Some(&product.stock_status),
            image_id: product.image_id,
            menu_order,
        }
    }

    fn from_variation(parent: &'a SnapshotProduct, variation: &'a SnapshotVariation, menu_order: i64) -> Self {
        Self {
            id: variation.id,
            kind: KIND_VARIATION,
            parent_id: Some(parent.id),
            status: &parent.status,
            enabled: variation.enabled,
            title: "",
            permalink: "",
            short_description: "",
            regular_price: variation.regular_price.map(|p| p.to_string()),
            sale_price: variation.sale_price.map(|p| p.to_string()),
            sale_from: variation.date_on_sale_from.map(|d| d.to_rfc3339()),
            sale_to: variation.date_on_sale_to.map(|d| d.to_rfc3339()),
            manage_stock: variation.manage_stock,
            stock_quantity: variation.stock_quantity,
            stock_status: variation.stock_status.as_deref(),
            image_id: variation.image_id,
            menu_order,
        }
    }
}

async fn upsert_record(conn: &mut SqliteConnection, r: &ProductRecord<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO products (id, kind, parent_id, status, enabled, title, permalink,
            short_description, regular_price, sale_price, sale_from, sale_to,
            manage_stock, stock_quantity, stock_status, image_id, menu_order)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            parent_id = excluded.parent_id,
            status = excluded.status,
            enabled = excluded.enabled,
            title = excluded.title,
            permalink = excluded.permalink,
            short_description = excluded.short_description,
            regular_price = excluded.regular_price,
            sale_price = excluded.sale_price,
            sale_from = excluded.sale_from,
            sale_to = excluded.sale_to,
            manage_stock = excluded.manage_stock,
            stock_quantity = excluded.stock_quantity,
            stock_status = excluded.stock_status,
            image_id = excluded.image_id,
            menu_order = excluded.menu_order
    "#,
    )
    .bind(r.id)
    .bind(r.kind)
    .bind(r.parent_id)
    .bind(r.status)
    .bind(r.enabled)
    .bind(r.title)
    .bind(r.permalink)
    .bind(r.short_description)
    .bind(&r.regular_price)
    .bind(&r.sale_price)
    .bind(&r.sale_from)
    .bind(&r.sale_to)
    .bind(r.manage_stock)
    .bind(r.stock_quantity)
    .bind(r.stock_status)
    .bind(r.image_id)
    .bind(r.menu_order)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stores sanitised snapshot metadata. Returns (stored, rejected).
async fn import_meta(conn: &mut SqliteConnection, product: &SnapshotProduct) -> Result<(usize, usize)> {
    let (mut stored, mut rejected) = (0, 0);
    for (key, value) in &product.meta {
        let raw = meta_value_to_raw(value);
        match sanitize_field(key, &raw) {
            Ok(Some(clean)) => {
                sqlx::query(
                    r#"
                    INSERT INTO product_meta (product_id, key, value) VALUES (?, ?, ?)
                    ON CONFLICT(product_id, key) DO UPDATE SET value = excluded.value
                "#,
                )
                .bind(product.id)
                .bind(key)
                .bind(&clean)
                .execute(&mut *conn)
                .await?;
                stored += 1;
            }
            Ok(None) => {
                sqlx::query("DELETE FROM product_meta WHERE product_id = ? AND key = ?")
                    .bind(product.id)
                    .bind(key)
                    .execute(&mut *conn)
                    .await?;
            }
            Err(e) => {
                tracing::warn!(product_id = product.id, key = %key, error = %e, "Skipping product metadata");
                rejected += 1;
            }
        }
    }
    Ok((stored, rejected))
}

impl Database {
    // ========================================================================
    // Catalog Import
    // ========================================================================

    /// Upserts a catalog snapshot in one transaction.
    ///
    /// Products are matched by id. A variable product's variations are
    /// replaced wholesale by the snapshot's list. Metadata keys present in
    /// the snapshot are sanitised and stored; keys it does not mention keep
    /// their current value.
    pub async fn import_snapshot(&self, snapshot: &CatalogSnapshot) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut tx = self.pool.begin().await?;

        for (position, product) in snapshot.products.iter().enumerate() {
            upsert_record(&mut tx, &ProductRecord::from_product(product, position as i64)).await?;

            sqlx::query("DELETE FROM product_categories WHERE product_id = ?")
                .bind(product.id)
                .execute(&mut *tx)
                .await?;
            for chunk in product.categories.chunks(INSERT_CHUNK) {
                let mut builder: QueryBuilder<sqlx::Sqlite> =
                    QueryBuilder::new("INSERT OR IGNORE INTO product_categories (product_id, slug) ");
                builder.push_values(chunk, |mut b, slug| {
                    b.push_bind(product.id).push_bind(slug.trim());
                });
                builder.build().execute(&mut *tx).await?;
            }

            // Variation rows cascade to their attributes.
            sqlx::query("DELETE FROM products WHERE parent_id = ?")
                .bind(product.id)
                .execute(&mut *tx)
                .await?;
            for (order, variation) in product.variations.iter().enumerate() {
                upsert_record(
                    &mut tx,
                    &ProductRecord::from_variation(product, variation, order as i64),
                )
                .await?;

                sqlx::query("DELETE FROM variation_attributes WHERE product_id = ?")
                    .bind(variation.id)
                    .execute(&mut *tx)
                    .await?;
                let attributes = variation.attribute_pairs();
                let positioned: Vec<_> = attributes.iter().enumerate().collect();
                for chunk in positioned.chunks(INSERT_CHUNK) {
                    let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                        "INSERT INTO variation_attributes (product_id, position, name, value) ",
                    );
                    builder.push_values(chunk, |mut b, (pos, (name, value))| {
                        b.push_bind(variation.id)
                            .push_bind(*pos as i64)
                            .push_bind(name)
                            .push_bind(value);
                    });
                    builder.build().execute(&mut *tx).await?;
                }
                report.variations += 1;
            }

            let (stored, rejected) = import_meta(&mut tx, product).await?;
            report.meta_fields += stored;
            report.rejected_meta += rejected;
            report.products += 1;
        }

        for image in &snapshot.images {
            sqlx::query("DELETE FROM image_sizes WHERE image_id = ?")
                .bind(image.id)
                .execute(&mut *tx)
                .await?;
            let sizes: Vec<_> = image
                .sizes
                .iter()
                .filter(|(_, url)| !url.trim().is_empty())
                .collect();
            for chunk in sizes.chunks(INSERT_CHUNK) {
                let mut builder: QueryBuilder<sqlx::Sqlite> =
                    QueryBuilder::new("INSERT INTO image_sizes (image_id, size, url) ");
                builder.push_values(chunk, |mut b, (size, url)| {
                    b.push_bind(image.id).push_bind(size.as_str()).push_bind(url.trim());
                });
                builder.build().execute(&mut *tx).await?;
            }
            report.images += 1;
        }

        tx.commit().await?;

        tracing::info!(
            products = report.products,
            variations = report.variations,
            images = report.images,
            meta_fields = report.meta_fields,
            rejected_meta = report.rejected_meta,
            "Imported catalog snapshot"
        );
        Ok(report)
    }

    // ========================================================================
    // Catalog Loading
    // ========================================================================

    /// Loads the published catalog for one feed run.
    ///
    /// With category filtering enabled only products in one of the included
    /// categories are selected; an empty include list selects nothing.
    /// Variable products carry their enabled variations only.
    pub async fn load_catalog(&self, settings: &Settings) -> Result<Catalog> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE kind IN ('{KIND_SIMPLE}', '{KIND_VARIABLE}') AND status = 'publish'"
        ));
        if let Some(categories) = settings.category_filter() {
            if categories.is_empty() {
                tracing::info!("Category filter enabled with no included categories, feed is empty");
                return Ok(Catalog::default());
            }
            builder.push(" AND id IN (SELECT product_id FROM product_categories WHERE slug IN (");
            let mut separated = builder.separated(", ");
            for slug in categories {
                separated.push_bind(slug.as_str());
            }
            separated.push_unseparated("))");
        }
        builder.push(" ORDER BY menu_order, id");

        let rows: Vec<ProductRow> = builder
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut categories: HashMap<i64, Vec<String>> = HashMap::new();
        let category_rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT product_id, slug FROM product_categories ORDER BY product_id, slug")
                .fetch_all(&self.pool)
                .await?;
        for (id, slug) in category_rows {
            categories.entry(id).or_default().push(slug);
        }

        let mut meta: HashMap<i64, HashMap<String, String>> = HashMap::new();
        let meta_rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT product_id, key, value FROM product_meta")
                .fetch_all(&self.pool)
                .await?;
        for (id, key, value) in meta_rows {
            meta.entry(id).or_default().insert(key, value);
        }

        let mut attributes: HashMap<i64, Vec<(String, String)>> = HashMap::new();
        let attribute_rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT product_id, name, value FROM variation_attributes ORDER BY product_id, position",
        )
        .fetch_all(&self.pool)
        .await?;
        for (id, name, value) in attribute_rows {
            attributes.entry(id).or_default().push((name, value));
        }

        let mut variations: HashMap<i64, Vec<Variation>> = HashMap::new();
        let variation_rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE kind = '{KIND_VARIATION}' AND enabled = 1 \
             ORDER BY parent_id, menu_order, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        for row in variation_rows {
            let Some(parent_id) = row.parent_id else {
                continue;
            };
            variations.entry(parent_id).or_default().push(Variation {
                id: row.id,
                attributes: attributes.remove(&row.id).unwrap_or_default(),
                pricing: row.own_pricing(),
                stock: row.own_stock(),
                image_id: row.image_id,
            });
        }

        let mut images = ImageLibrary::default();
        let image_rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT image_id, size, url FROM image_sizes")
                .fetch_all(&self.pool)
                .await?;
        for (id, size, url) in image_rows {
            images.insert(id, size, url);
        }

        let products: Vec<Product> = rows
            .into_iter()
            .map(|row| {
                let kind = if row.kind == KIND_VARIABLE {
                    ProductKind::Variable
                } else {
                    ProductKind::Simple
                };
                let raw_meta = meta.remove(&row.id).unwrap_or_default();
                Product {
                    id: row.id,
                    kind,
                    pricing: row.pricing(),
                    stock: row.stock(),
                    image_id: row.image_id,
                    categories: categories.remove(&row.id).unwrap_or_default(),
                    meta: ProductMeta::from_raw(&raw_meta),
                    variations: match kind {
                        ProductKind::Variable => variations.remove(&row.id).unwrap_or_default(),
                        ProductKind::Simple => Vec::new(),
                    },
                    title: row.title,
                    permalink: row.permalink,
                    short_description: row.short_description,
                }
            })
            .collect();

        tracing::debug!(
            products = products.len(),
            images = images.len(),
            "Loaded catalog"
        );
        Ok(Catalog { products, images })
    }

    /// Number of published products and variations, for status output.
    pub async fn catalog_counts(&self) -> Result<(i64, i64)> {
        let (products, variations): (i64, i64) = sqlx::query_as(&format!(
            "SELECT \
                COALESCE(SUM(kind != '{KIND_VARIATION}'), 0), \
                COALESCE(SUM(kind = '{KIND_VARIATION}'), 0) \
             FROM products WHERE status = 'publish'"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok((products, variations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Pricing, Stock};
    use crate::meta::GoogleAttribute;
    use rust_decimal::Decimal;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    const SNAPSHOT: &str = r#"{
        "products": [
            {
                "id": 10, "type": "variable", "title": "Tee",
                "permalink": "https://shop.example.com/tee",
                "regular_price": "20.00", "stock_status": "instock",
                "image_id": 3, "categories": ["shirts", "sale"],
                "meta": {
                    "brand": "Acme",
                    "gtin": "not digits",
                    "attribute_map": {"color": "pa_color", "size": "pa_size", "flavour": "pa_x"}
                },
                "variations": [
                    {"id": 11, "attributes": {"pa_size": "m", "pa_color": "red"}, "regular_price": 22},
                    {"id": 12, "attributes": {"pa_size": "l", "pa_color": "blue"}, "manage_stock": true, "stock_quantity": 0},
                    {"id": 13, "enabled": false, "attributes": {"pa_size": "s", "pa_color": "red"}}
                ]
            },
            {
                "id": 1, "type": "simple", "title": "Mug",
                "permalink": "https://shop.example.com/mug",
                "regular_price": "9.50", "sale_price": "7.00",
                "date_on_sale_from": "2026-01-01T00:00:00+00:00",
                "manage_stock": true, "stock_quantity": 5,
                "categories": ["kitchen"],
                "meta": {"adult": false, "multipack": true, "multipack_quantity": 6}
            },
            {"id": 2, "type": "simple", "status": "draft", "title": "Hidden"}
        ],
        "images": [
            {"id": 3, "sizes": {"full": "https://cdn.example.com/3.jpg", "thumbnail": ""}}
        ]
    }"#;

    async fn imported_db() -> Database {
        let db = test_db().await;
        let snapshot = CatalogSnapshot::parse(SNAPSHOT).unwrap();
        db.import_snapshot(&snapshot).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_import_report() {
        let db = test_db().await;
        let snapshot = CatalogSnapshot::parse(SNAPSHOT).unwrap();
        let report = db.import_snapshot(&snapshot).await.unwrap();
        assert_eq!(
            report,
            ImportReport {
                products: 3,
                variations: 3,
                images: 1,
                // brand, attribute_map, adult, multipack, multipack_quantity
                meta_fields: 5,
                rejected_meta: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_load_published_products_in_snapshot_order() {
        let db = imported_db().await;
        let catalog = db.load_catalog(&Settings::default()).await.unwrap();

        let ids: Vec<_> = catalog.products.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![10, 1]);

        let tee = &catalog.products[0];
        assert_eq!(tee.kind, ProductKind::Variable);
        assert_eq!(tee.categories, vec!["sale", "shirts"]);
        assert_eq!(tee.meta.brand.as_deref(), Some("Acme"));
        assert_eq!(tee.meta.gtin, None);
        assert_eq!(tee.meta.attribute_map.len(), 2);
        assert_eq!(
            tee.meta.attribute_map.get(&GoogleAttribute::Color).map(String::as_str),
            Some("pa_color")
        );
        assert_eq!(tee.image_id, Some(3));
    }

    #[tokio::test]
    async fn test_variations_loaded_with_inheritance() {
        let db = imported_db().await;
        let catalog = db.load_catalog(&Settings::default()).await.unwrap();
        let tee = &catalog.products[0];

        // Disabled variation 13 is not loaded.
        let ids: Vec<_> = tee.variations.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![11, 12]);

        let first = &tee.variations[0];
        assert_eq!(
            first.attributes,
            vec![
                ("pa_size".to_string(), "m".to_string()),
                ("pa_color".to_string(), "red".to_string())
            ]
        );
        assert_eq!(
            first.pricing.as_ref().and_then(|p| p.regular),
            Some(Decimal::new(22, 0))
        );
        assert_eq!(first.stock, None);

        let second = &tee.variations[1];
        assert_eq!(second.pricing, None);
        assert_eq!(second.stock, Some(Stock::Managed { quantity: Some(0) }));
        assert_eq!(tee.pricing_for(Some(second)).regular, Some(Decimal::new(2000, 2)));
    }

    #[tokio::test]
    async fn test_simple_product_columns_round_trip() {
        let db = imported_db().await;
        let catalog = db.load_catalog(&Settings::default()).await.unwrap();
        let mug = catalog.products.iter().find(|p| p.id == 1).unwrap();

        assert_eq!(mug.kind, ProductKind::Simple);
        assert_eq!(mug.stock, Stock::Managed { quantity: Some(5) });
        assert_eq!(
            mug.pricing,
            Pricing {
                regular: Some(Decimal::new(950, 2)),
                sale: Some(Decimal::new(700, 2)),
                sale_from: Some(chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00+00:00").unwrap()),
                sale_to: None,
            }
        );
        assert!(mug.meta.multipack);
        assert_eq!(mug.meta.multipack_size(), Some(6));
        assert!(!mug.meta.adult);
    }

    #[tokio::test]
    async fn test_images_skip_blank_renditions() {
        let db = imported_db().await;
        let catalog = db.load_catalog(&Settings::default()).await.unwrap();
        assert_eq!(catalog.images.len(), 1);
        assert_eq!(
            catalog.images.resolve(3, "thumbnail"),
            Some("https://cdn.example.com/3.jpg")
        );
    }

    #[tokio::test]
    async fn test_category_filter() {
        let db = imported_db().await;
        let mut settings = Settings {
            filter_by_category: true,
            included_categories: vec!["kitchen".into()],
            ..Settings::default()
        };
        let catalog = db.load_catalog(&settings).await.unwrap();
        let ids: Vec<_> = catalog.products.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);

        settings.included_categories = vec!["shirts".into(), "kitchen".into()];
        let catalog = db.load_catalog(&settings).await.unwrap();
        assert_eq!(catalog.products.len(), 2);

        settings.included_categories.clear();
        let catalog = db.load_catalog(&settings).await.unwrap();
        assert!(catalog.products.is_empty());
    }

    #[tokio::test]
    async fn test_reimport_replaces_variations_and_keeps_meta() {
        let db = imported_db().await;
        db.set_product_meta(10, "mpn", "TEE01").await.unwrap();

        let update = r#"{"products": [{
            "id": 10, "type": "variable", "title": "Tee v2",
            "meta": {"brand": ""},
            "variations": [{"id": 14, "attributes": {"pa_size": "xl"}}]
        }]}"#;
        let report = db
            .import_snapshot(&CatalogSnapshot::parse(update).unwrap())
            .await
            .unwrap();
        assert_eq!(report.products, 1);
        assert_eq!(report.meta_fields, 0);

        let catalog = db.load_catalog(&Settings::default()).await.unwrap();
        let tee = catalog.products.iter().find(|p| p.id == 10).unwrap();
        assert_eq!(tee.title, "Tee v2");
        let ids: Vec<_> = tee.variations.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![14]);
        // Blank brand deletes; mpn set outside the snapshot survives.
        assert_eq!(tee.meta.brand, None);
        assert_eq!(tee.meta.mpn.as_deref(), Some("TEE01"));

        let orphans: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM variation_attributes WHERE product_id IN (11, 12, 13)",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(orphans.0, 0);
    }

    #[tokio::test]
    async fn test_catalog_counts() {
        let db = imported_db().await;
        // Draft product 2 is excluded; all three variations inherit "publish".
        assert_eq!(db.catalog_counts().await.unwrap(), (2, 3));
    }

    #[tokio::test]
    async fn test_empty_database_loads_empty_catalog() {
        let db = test_db().await;
        let catalog = db.load_catalog(&Settings::default()).await.unwrap();
        assert!(catalog.products.is_empty());
        assert!(catalog.images.is_empty());
    }
}
