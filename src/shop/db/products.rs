use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use serde::Deserialize;
use sportshub_common::{Product, ProductDetail, Stock};

use super::{ShopDb, check_quantity, required};
use crate::errors::ShopError;

const PRODUCT_COLUMNS: &str =
    "id, name, description, brand, category, price_cents, image_url, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub brand: String,
    pub category: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price_cents: Option<i64>,
    /// Absent keeps the current image, `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
}

/// Deserialize a field that was present in the body, including an explicit
/// `null`, as `Some`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Catalog query: `category` is an exact match, `search` a case-insensitive
/// substring of name or brand.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

fn check_price(price_cents: i64) -> Result<()> {
    if price_cents < 0 {
        return Err(ShopError::validation("price_cents must not be negative").into());
    }
    Ok(())
}

impl ShopDb {
    // ── Product CRUD ──────────────────────────────────────────────────

    pub fn create_product(&self, new: &NewProduct) -> Result<Product> {
        let name = required("name", &new.name)?;
        let category = required("category", &new.category)?;
        check_price(new.price_cents)?;

        self.conn
            .execute(
                "INSERT INTO products (name, description, brand, category, price_cents, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    name,
                    new.description.trim(),
                    new.brand.trim(),
                    category,
                    new.price_cents,
                    new.image_url
                ],
            )
            .context("Failed to insert product")?;
        let id = self.conn.last_insert_rowid();
        self.get_product(id)?.context("Product not found after insert")
    }

    pub fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let category = filter
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let search = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(&s)));

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products
                 WHERE (?1 IS NULL OR category = ?1)
                   AND (?2 IS NULL OR lower(name) LIKE ?2 ESCAPE '\\' OR lower(brand) LIKE ?2 ESCAPE '\\')
                 ORDER BY id"
            ))
            .context("Failed to prepare list_products")?;
        let rows = stmt
            .query_map(params![category, search], read_product_row)
            .context("Failed to query products")?;
        let mut products = Vec::new();
        for row in rows {
            products.push(row.context("Failed to read product row")?);
        }
        Ok(products)
    }

    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        self.conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                read_product_row,
            )
            .optional()
            .context("Failed to query product")
    }

    pub fn require_product(&self, id: i64) -> Result<Product> {
        self.get_product(id)?
            .ok_or_else(|| ShopError::ProductNotFound { id }.into())
    }

    pub fn get_product_detail(&self, id: i64) -> Result<Option<ProductDetail>> {
        let product = match self.get_product(id)? {
            Some(p) => p,
            None => return Ok(None),
        };
        let stock = self.list_stock(id)?;
        let (review_count, average_rating): (i64, Option<f64>) = self
            .conn
            .query_row(
                "SELECT COUNT(*), AVG(rating) FROM reviews WHERE product_id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Failed to aggregate reviews")?;

        Ok(Some(ProductDetail {
            product,
            stock,
            review_count,
            average_rating,
        }))
    }

    pub fn update_product(&self, id: i64, patch: &ProductPatch) -> Result<Product> {
        self.require_product(id)?;
        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        let category = patch
            .category
            .as_deref()
            .map(|c| required("category", c))
            .transpose()?;
        if let Some(price) = patch.price_cents {
            check_price(price)?;
        }

        self.conn
            .execute(
                "UPDATE products SET
                    name = COALESCE(?1, name),
                    description = COALESCE(?2, description),
                    brand = COALESCE(?3, brand),
                    category = COALESCE(?4, category),
                    price_cents = COALESCE(?5, price_cents),
                    image_url = CASE WHEN ?6 THEN ?7 ELSE image_url END,
                    updated_at = datetime('now')
                 WHERE id = ?8",
                params![
                    name,
                    patch.description.as_deref().map(str::trim),
                    patch.brand.as_deref().map(str::trim),
                    category,
                    patch.price_cents,
                    patch.image_url.is_some(),
                    patch.image_url.clone().flatten(),
                    id
                ],
            )
            .context("Failed to update product")?;
        self.require_product(id)
    }

    /// Products that appear in placed orders stay, since order items point
    /// at them.
    pub fn delete_product(&self, id: i64) -> Result<bool> {
        let ordered: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM order_items WHERE product_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check order references")?;
        if ordered {
            return Err(ShopError::ProductInUse { id }.into());
        }
        let count = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])
            .context("Failed to delete product")?;
        Ok(count > 0)
    }

    // ── Stock ─────────────────────────────────────────────────────────

    pub fn list_stock(&self, product_id: i64) -> Result<Vec<Stock>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, product_id, size, quantity FROM stock WHERE product_id = ?1 ORDER BY size",
            )
            .context("Failed to prepare list_stock")?;
        let rows = stmt
            .query_map(params![product_id], read_stock_row)
            .context("Failed to query stock")?;
        let mut stock = Vec::new();
        for row in rows {
            stock.push(row.context("Failed to read stock row")?);
        }
        Ok(stock)
    }

    pub fn get_stock(&self, id: i64) -> Result<Option<Stock>> {
        self.conn
            .query_row(
                "SELECT id, product_id, size, quantity FROM stock WHERE id = ?1",
                params![id],
                read_stock_row,
            )
            .optional()
            .context("Failed to query stock row")
    }

    /// Create or replace the quantity for one size of a product.
    pub fn upsert_stock(&self, product_id: i64, size: &str, quantity: i64) -> Result<Stock> {
        self.require_product(product_id)?;
        let size = required("size", size)?;
        check_quantity(quantity, 0)?;

        self.conn
            .execute(
                "INSERT INTO stock (product_id, size, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT(product_id, size) DO UPDATE SET quantity = excluded.quantity",
                params![product_id, size, quantity],
            )
            .context("Failed to upsert stock")?;
        self.conn
            .query_row(
                "SELECT id, product_id, size, quantity FROM stock WHERE product_id = ?1 AND size = ?2",
                params![product_id, size],
                read_stock_row,
            )
            .context("Stock row not found after upsert")
    }

    pub fn set_stock_quantity(&self, id: i64, quantity: i64) -> Result<Stock> {
        check_quantity(quantity, 0)?;
        let count = self
            .conn
            .execute(
                "UPDATE stock SET quantity = ?1 WHERE id = ?2",
                params![quantity, id],
            )
            .context("Failed to update stock quantity")?;
        if count == 0 {
            return Err(ShopError::StockNotFound { id }.into());
        }
        self.get_stock(id)?.context("Stock row not found after update")
    }

    pub fn delete_stock(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM stock WHERE id = ?1", params![id])
            .context("Failed to delete stock row")?;
        Ok(count > 0)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Escape `LIKE` wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn read_product_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        brand: row.get(3)?,
        category: row.get(4)?,
        price_cents: row.get(5)?,
        image_url: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(super) fn read_stock_row(row: &Row<'_>) -> rusqlite::Result<Stock> {
    Ok(Stock {
        id: row.get(0)?,
        product_id: row.get(1)?,
        size: row.get(2)?,
        quantity: row.get(3)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_product(name: &str, category: &str, price_cents: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: String::new(),
            brand: String::new(),
            category: category.to_string(),
            price_cents,
            image_url: None,
        }
    }

    #[test]
    fn test_create_and_get_product() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let product = db.create_product(&NewProduct {
            brand: "Kicker".to_string(),
            description: "Size 5 match ball".to_string(),
            ..new_product("Match Ball", "football", 2999)
        })?;
        assert!(product.id > 0);
        assert_eq!(product.name, "Match Ball");
        assert_eq!(product.brand, "Kicker");
        assert_eq!(product.price_cents, 2999);

        let fetched = db.get_product(product.id)?.expect("product should exist");
        assert_eq!(fetched.description, "Size 5 match ball");
        Ok(())
    }

    #[test]
    fn test_create_product_validation() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        assert!(db.create_product(&new_product("", "football", 10)).is_err());
        assert!(db.create_product(&new_product("Ball", " ", 10)).is_err());
        let err = db.create_product(&new_product("Ball", "football", -1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_list_products_filters() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        db.create_product(&NewProduct {
            brand: "Swoosh".into(),
            ..new_product("Air Runner", "shoes", 12000)
        })?;
        db.create_product(&new_product("Court Shoe", "shoes", 9000))?;
        db.create_product(&new_product("Swim Cap", "swimming", 1500))?;

        assert_eq!(db.list_products(&ProductFilter::default())?.len(), 3);

        let shoes = db.list_products(&ProductFilter {
            category: Some("shoes".into()),
            search: None,
        })?;
        assert_eq!(shoes.len(), 2);

        let by_name = db.list_products(&ProductFilter {
            category: None,
            search: Some("CAP".into()),
        })?;
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Swim Cap");

        let by_brand = db.list_products(&ProductFilter {
            category: Some("shoes".into()),
            search: Some("swoosh".into()),
        })?;
        assert_eq!(by_brand.len(), 1);
        assert_eq!(by_brand[0].name, "Air Runner");

        let blank = db.list_products(&ProductFilter {
            category: Some("".into()),
            search: Some("  ".into()),
        })?;
        assert_eq!(blank.len(), 3);
        Ok(())
    }

    #[test]
    fn test_update_product_partial() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let product = db.create_product(&new_product("Racket", "tennis", 5000))?;
        let updated = db.update_product(
            product.id,
            &ProductPatch {
                price_cents: Some(4500),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.price_cents, 4500);
        assert_eq!(updated.name, "Racket");
        assert_eq!(updated.category, "tennis");

        assert!(db
            .update_product(product.id, &ProductPatch { price_cents: Some(-5), ..Default::default() })
            .is_err());
        let missing = db.update_product(404, &ProductPatch::default()).unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<ShopError>(),
            Some(ShopError::ProductNotFound { id: 404 })
        ));
        Ok(())
    }

    #[test]
    fn test_stock_upsert_and_update() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let product = db.create_product(&new_product("Jersey", "apparel", 6000))?;

        let m = db.upsert_stock(product.id, "M", 10)?;
        db.upsert_stock(product.id, "L", 4)?;
        let m_again = db.upsert_stock(product.id, "M", 7)?;
        assert_eq!(m.id, m_again.id);
        assert_eq!(m_again.quantity, 7);

        let stock = db.list_stock(product.id)?;
        assert_eq!(stock.len(), 2);
        assert_eq!(stock[0].size, "L");

        let set = db.set_stock_quantity(m.id, 0)?;
        assert_eq!(set.quantity, 0);
        assert!(db.set_stock_quantity(m.id, -1).is_err());
        assert!(db.set_stock_quantity(999, 1).is_err());

        assert!(db.upsert_stock(999, "M", 1).is_err());
        assert!(db.upsert_stock(product.id, "", 1).is_err());

        assert!(db.delete_stock(m.id)?);
        assert!(!db.delete_stock(m.id)?);
        Ok(())
    }

    #[test]
    fn test_product_detail_includes_stock_and_reviews() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let product = db.create_product(&new_product("Glove", "baseball", 3000))?;
        db.upsert_stock(product.id, "S", 2)?;

        let detail = db.get_product_detail(product.id)?.expect("detail");
        assert_eq!(detail.stock.len(), 1);
        assert_eq!(detail.review_count, 0);
        assert!(detail.average_rating.is_none());

        let a = db.create_user("A", "a@example.com", "pw")?;
        let b = db.create_user("B", "b@example.com", "pw")?;
        db.create_review(product.id, a.id, 4, "good")?;
        db.create_review(product.id, b.id, 5, "great")?;
        let detail = db.get_product_detail(product.id)?.expect("detail");
        assert_eq!(detail.review_count, 2);
        assert_eq!(detail.average_rating, Some(4.5));

        assert!(db.get_product_detail(12345)?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_product_cascades_stock_cart_and_reviews() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let user = db.create_user("Fan", "fan@example.com", "pw")?;
        let product = db.create_product(&new_product("Bat", "cricket", 8000))?;
        let keeper = db.create_product(&new_product("Pads", "cricket", 4000))?;
        let row = db.upsert_stock(product.id, "SH", 3)?;
        db.add_to_cart(user.id, product.id, "SH", 1)?;
        db.add_to_cart(user.id, keeper.id, "M", 1)?;
        let review = db.create_review(product.id, user.id, 4, "light")?;

        assert!(db.delete_product(product.id)?);
        assert!(db.get_stock(row.id)?.is_none());
        assert!(db.get_review(review.id)?.is_none());
        let cart = db.get_cart(user.id)?;
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].item.product_id, keeper.id);
        assert!(!db.delete_product(product.id)?);
        Ok(())
    }

    #[test]
    fn test_patch_can_clear_image_url() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let product = db.create_product(&NewProduct {
            image_url: Some("/img/cleat.png".into()),
            ..new_product("Cleat", "football", 7000)
        })?;

        let keep: ProductPatch = serde_json::from_value(serde_json::json!({"name": "Cleat 2"}))?;
        assert_eq!(keep.image_url, None);
        let kept = db.update_product(product.id, &keep)?;
        assert_eq!(kept.image_url.as_deref(), Some("/img/cleat.png"));

        let clear: ProductPatch = serde_json::from_value(serde_json::json!({"image_url": null}))?;
        assert_eq!(clear.image_url, Some(None));
        let cleared = db.update_product(product.id, &clear)?;
        assert_eq!(cleared.image_url, None);
        assert_eq!(cleared.name, "Cleat 2");

        let set = db.update_product(
            product.id,
            &ProductPatch {
                image_url: Some(Some("/img/new.png".into())),
                ..Default::default()
            },
        )?;
        assert_eq!(set.image_url.as_deref(), Some("/img/new.png"));
        Ok(())
    }

    #[test]
    fn test_search_treats_wildcards_literally() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        db.create_product(&new_product("Ball", "football", 1000))?;
        db.create_product(&new_product("100% Wool Socks", "apparel", 900))?;
        db.create_product(&new_product("Grip_Tape", "tennis", 500))?;

        let search = |term: &str| -> Result<Vec<String>> {
            Ok(db
                .list_products(&ProductFilter {
                    category: None,
                    search: Some(term.into()),
                })?
                .into_iter()
                .map(|p| p.name)
                .collect())
        };
        assert_eq!(search("_")?, vec!["Grip_Tape"]);
        assert_eq!(search("%")?, vec!["100% Wool Socks"]);
        assert!(search("\\")?.is_empty());
        assert_eq!(search("ball")?, vec!["Ball"]);
        Ok(())
    }

    #[test]
    fn test_stock_quantity_is_bounded() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let product = db.create_product(&new_product("Cone", "training", 300))?;
        let row = db.upsert_stock(product.id, "std", crate::shop::db::MAX_QUANTITY)?;
        let err = db.set_stock_quantity(row.id, crate::shop::db::MAX_QUANTITY + 1).unwrap_err();
        assert!(matches!(err.downcast_ref::<ShopError>(), Some(ShopError::Validation(_))));
        assert!(db.upsert_stock(product.id, "std", i64::MAX).is_err());
        Ok(())
    }
}
