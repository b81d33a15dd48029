use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use sportshub_common::{CartItem, CartLine, CartView};

use super::{MAX_QUANTITY, ShopDb, check_quantity, required};
use crate::errors::ShopError;

const CART_COLUMNS: &str = "id, user_id, product_id, size, quantity, added_at";

impl ShopDb {
    // ── Cart ──────────────────────────────────────────────────────────

    /// The user's cart priced at current product prices.
    pub fn get_cart(&self, user_id: i64) -> Result<CartView> {
        self.require_user(user_id)?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.user_id, c.product_id, c.size, c.quantity, c.added_at,
                        p.name, p.price_cents
                 FROM cart_items c JOIN products p ON p.id = c.product_id
                 WHERE c.user_id = ?1 ORDER BY c.id",
            )
            .context("Failed to prepare get_cart")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let item = read_cart_row(row)?;
                Ok((item, row.get::<_, String>(6)?, row.get::<_, i64>(7)?))
            })
            .context("Failed to query cart")?;
        let mut lines = Vec::new();
        for row in rows {
            let (item, product_name, unit_price_cents) = row.context("Failed to read cart row")?;
            let line = CartLine::priced(item, product_name, unit_price_cents)
                .ok_or_else(|| ShopError::validation("cart line total overflows"))?;
            lines.push(line);
        }
        CartView::from_lines(user_id, lines)
            .ok_or_else(|| ShopError::validation("cart total overflows").into())
    }

    /// Add to the cart. Adding a product/size that is already in the cart
    /// increases its quantity. Stock is not reserved until checkout.
    pub fn add_to_cart(
        &self,
        user_id: i64,
        product_id: i64,
        size: &str,
        quantity: i64,
    ) -> Result<CartItem> {
        self.require_user(user_id)?;
        self.require_product(product_id)?;
        let size = required("size", size)?;
        check_quantity(quantity, 1)?;

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT quantity FROM cart_items WHERE user_id = ?1 AND product_id = ?2 AND size = ?3",
                params![user_id, product_id, size],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read cart item")?;
        let merged = existing.unwrap_or(0).saturating_add(quantity);
        if merged > MAX_QUANTITY {
            return Err(ShopError::validation(format!(
                "cart line would hold {} units, the limit is {}",
                merged, MAX_QUANTITY
            ))
            .into());
        }

        self.conn
            .execute(
                "INSERT INTO cart_items (user_id, product_id, size, quantity) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, product_id, size) DO UPDATE SET quantity = excluded.quantity",
                params![user_id, product_id, size, merged],
            )
            .context("Failed to add cart item")?;
        self.conn
            .query_row(
                &format!(
                    "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = ?1 AND product_id = ?2 AND size = ?3"
                ),
                params![user_id, product_id, size],
                read_cart_row,
            )
            .context("Cart item not found after insert")
    }

    pub fn set_cart_quantity(&self, user_id: i64, item_id: i64, quantity: i64) -> Result<CartItem> {
        check_quantity(quantity, 1)?;
        let count = self
            .conn
            .execute(
                "UPDATE cart_items SET quantity = ?1 WHERE id = ?2 AND user_id = ?3",
                params![quantity, item_id, user_id],
            )
            .context("Failed to update cart item")?;
        if count == 0 {
            return Err(ShopError::CartItemNotFound { id: item_id }.into());
        }
        self.get_cart_item(user_id, item_id)?
            .context("Cart item not found after update")
    }

    pub fn remove_cart_item(&self, user_id: i64, item_id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM cart_items WHERE id = ?1 AND user_id = ?2",
                params![item_id, user_id],
            )
            .context("Failed to remove cart item")?;
        Ok(count > 0)
    }

    pub fn clear_cart(&self, user_id: i64) -> Result<usize> {
        self.require_user(user_id)?;
        self.conn
            .execute("DELETE FROM cart_items WHERE user_id = ?1", params![user_id])
            .context("Failed to clear cart")
    }

    fn get_cart_item(&self, user_id: i64, item_id: i64) -> Result<Option<CartItem>> {
        self.conn
            .query_row(
                &format!("SELECT {CART_COLUMNS} FROM cart_items WHERE id = ?1 AND user_id = ?2"),
                params![item_id, user_id],
                read_cart_row,
            )
            .optional()
            .context("Failed to query cart item")
    }
}

fn read_cart_row(row: &Row<'_>) -> rusqlite::Result<CartItem> {
    Ok(CartItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_id: row.get(2)?,
        size: row.get(3)?,
        quantity: row.get(4)?,
        added_at: row.get(5)?,
    })
}
