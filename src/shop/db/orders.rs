//! Order placement and order history.
//!
//! Checkout copies the cart into an order inside one transaction: every
//! stock row is checked and decremented, every order item written, and the
//! cart emptied, or none of it happens. Stock decrements are guarded with
//! `quantity >= requested` so a row can never go negative.

use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use sportshub_common::{Order, OrderDetail, OrderItem, OrderStatus, Stock};
use tracing::{debug, info};

use super::ShopDb;
use crate::errors::ShopError;

const ORDER_COLUMNS: &str =
    "id, user_id, status, total_cents, idempotency_key, created_at, updated_at";

/// Result of a checkout attempt.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub order: OrderDetail,
    /// True when an earlier order with the same idempotency key was returned
    /// and nothing was written.
    pub replayed: bool,
    /// Stock rows after decrement, for change notifications.
    pub stock: Vec<Stock>,
}

struct PendingLine {
    product_id: i64,
    size: String,
    quantity: i64,
    unit_price_cents: i64,
}

impl ShopDb {
    // ── Checkout ──────────────────────────────────────────────────────

    pub fn place_order(&self, user_id: i64, idempotency_key: Option<&str>) -> Result<Checkout> {
        self.require_user(user_id)?;
        let idempotency_key = idempotency_key.map(str::trim).filter(|k| !k.is_empty());

        if let Some(key) = idempotency_key {
            if let Some(order_id) = self.find_order_by_key(user_id, key)? {
                debug!(user_id, order_id, "checkout replayed by idempotency key");
                let order = self
                    .get_order_detail(order_id)?
                    .context("Order not found after idempotency lookup")?;
                return Ok(Checkout {
                    order,
                    replayed: true,
                    stock: Vec::new(),
                });
            }
        }

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        // Dropping `tx` without commit rolls everything back.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin checkout transaction")?;

        let lines = {
            let mut stmt = tx
                .prepare(
                    "SELECT c.product_id, c.size, c.quantity, p.price_cents
                     FROM cart_items c JOIN products p ON p.id = c.product_id
                     WHERE c.user_id = ?1 ORDER BY c.id",
                )
                .context("Failed to prepare cart snapshot")?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok(PendingLine {
                        product_id: row.get(0)?,
                        size: row.get(1)?,
                        quantity: row.get(2)?,
                        unit_price_cents: row.get(3)?,
                    })
                })
                .context("Failed to read cart for checkout")?;
            let mut lines = Vec::new();
            for row in rows {
                lines.push(row.context("Failed to read cart row")?);
            }
            lines
        };

        if lines.is_empty() {
            return Err(ShopError::EmptyCart { user_id }.into());
        }

        tx.execute(
            "INSERT INTO orders (user_id, status, total_cents, idempotency_key) VALUES (?1, ?2, 0, ?3)",
            params![user_id, OrderStatus::Pending.as_str(), idempotency_key],
        )
        .context("Failed to insert order")?;
        let order_id = tx.last_insert_rowid();

        let mut total_cents: i64 = 0;
        let mut touched = Vec::with_capacity(lines.len());
        for line in &lines {
            let row: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT id, quantity FROM stock WHERE product_id = ?1 AND size = ?2",
                    params![line.product_id, line.size],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("Failed to read stock row")?;
            let insufficient = |available: i64| ShopError::InsufficientStock {
                product_id: line.product_id,
                size: line.size.clone(),
                requested: line.quantity,
                available,
            };
            let stock_id = match row {
                Some((id, available)) if available >= line.quantity => id,
                Some((_, available)) => return Err(insufficient(available).into()),
                None => return Err(insufficient(0).into()),
            };

            let updated = tx
                .execute(
                    "UPDATE stock SET quantity = quantity - ?1 WHERE id = ?2 AND quantity >= ?1",
                    params![line.quantity, stock_id],
                )
                .context("Failed to decrement stock")?;
            if updated != 1 {
                return Err(insufficient(0).into());
            }
            touched.push(stock_id);

            tx.execute(
                "INSERT INTO order_items (order_id, product_id, size, quantity, unit_price_cents)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    order_id,
                    line.product_id,
                    line.size,
                    line.quantity,
                    line.unit_price_cents
                ],
            )
            .context("Failed to insert order item")?;

            total_cents = line
                .quantity
                .checked_mul(line.unit_price_cents)
                .and_then(|t| t.checked_add(total_cents))
                .ok_or_else(|| ShopError::validation("order total overflows"))?;
        }

        tx.execute(
            "UPDATE orders SET total_cents = ?1 WHERE id = ?2",
            params![total_cents, order_id],
        )
        .context("Failed to record order total")?;
        tx.execute("DELETE FROM cart_items WHERE user_id = ?1", params![user_id])
            .context("Failed to clear cart after checkout")?;
        tx.commit().context("Failed to commit checkout")?;

        info!(user_id, order_id, total_cents, items = lines.len(), "order placed");

        let order = self
            .get_order_detail(order_id)?
            .context("Order not found after checkout")?;
        let mut stock = Vec::with_capacity(touched.len());
        for id in touched {
            if let Some(row) = self.get_stock(id)? {
                stock.push(row);
            }
        }
        Ok(Checkout {
            order,
            replayed: false,
            stock,
        })
    }

    fn find_order_by_key(&self, user_id: i64, key: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM orders WHERE user_id = ?1 AND idempotency_key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up idempotency key")
    }

    // ── Order queries ─────────────────────────────────────────────────

    pub fn get_order(&self, id: i64) -> Result<Option<Order>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                params![id],
                read_order_row,
            )
            .optional()
            .context("Failed to query order")?;
        row.map(OrderRow::into_order).transpose()
    }

    pub fn get_order_detail(&self, id: i64) -> Result<Option<OrderDetail>> {
        let order = match self.get_order(id)? {
            Some(o) => o,
            None => return Ok(None),
        };
        let items = self.get_order_items(id)?;
        Ok(Some(OrderDetail { order, items }))
    }

    /// A user's orders, newest first.
    pub fn list_user_orders(&self, user_id: i64) -> Result<Vec<OrderDetail>> {
        self.require_user(user_id)?;
        self.query_order_details(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 ORDER BY id DESC"),
            params![user_id],
        )
    }

    /// Every order, newest first, optionally restricted to one status.
    pub fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<OrderDetail>> {
        self.query_order_details(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE (?1 IS NULL OR status = ?1) ORDER BY id DESC"
            ),
            params![status.map(|s| s.as_str())],
        )
    }

    /// Advance an order's status. Returns the previous status with the
    /// updated order.
    pub fn update_order_status(&self, id: i64, next: OrderStatus) -> Result<(OrderStatus, Order)> {
        let order = self
            .get_order(id)?
            .ok_or(ShopError::OrderNotFound { id })?;
        if !order.status.can_transition_to(next) {
            return Err(ShopError::InvalidTransition {
                order_id: id,
                from: order.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.conn
            .execute(
                "UPDATE orders SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![next.as_str(), id],
            )
            .context("Failed to update order status")?;
        let updated = self
            .get_order(id)?
            .context("Order not found after status update")?;
        Ok((order.status, updated))
    }

    fn get_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, order_id, product_id, size, quantity, unit_price_cents
                 FROM order_items WHERE order_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare get_order_items")?;
        let rows = stmt
            .query_map(params![order_id], |row| {
                Ok(OrderItem {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    product_id: row.get(2)?,
                    size: row.get(3)?,
                    quantity: row.get(4)?,
                    unit_price_cents: row.get(5)?,
                })
            })
            .context("Failed to query order items")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read order item row")?);
        }
        Ok(items)
    }

    fn query_order_details(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<OrderDetail>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare order query")?;
        let rows = stmt
            .query_map(params, read_order_row)
            .context("Failed to query orders")?;
        let mut details = Vec::new();
        for row in rows {
            let order = row.context("Failed to read order row")?.into_order()?;
            let items = self.get_order_items(order.id)?;
            details.push(OrderDetail { order, items });
        }
        Ok(details)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

struct OrderRow {
    id: i64,
    user_id: i64,
    status: String,
    total_cents: i64,
    idempotency_key: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_order_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: row.get(2)?,
        total_cents: row.get(3)?,
        idempotency_key: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        let status = OrderStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse order status")?;
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            status,
            total_cents: self.total_cents,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::db::products::tests::new_product;

    struct Fixture {
        db: ShopDb,
        user_id: i64,
        shoe_id: i64,
        shirt_id: i64,
    }

    /// One customer, a shoe with 5 in size 42 and a shirt with 2 in size M.
    fn fixture() -> Result<Fixture> {
        let db = ShopDb::new_in_memory()?;
        let user = db.create_user("Buyer", "buyer@example.com", "pw")?;
        let shoe = db.create_product(&new_product("Runner", "shoes", 10000))?;
        let shirt = db.create_product(&new_product("Tee", "apparel", 2500))?;
        db.upsert_stock(shoe.id, "42", 5)?;
        db.upsert_stock(shirt.id, "M", 2)?;
        Ok(Fixture {
            db,
            user_id: user.id,
            shoe_id: shoe.id,
            shirt_id: shirt.id,
        })
    }

    fn quantity(db: &ShopDb, product_id: i64, size: &str) -> i64 {
        db.list_stock(product_id)
            .unwrap()
            .into_iter()
            .find(|s| s.size == size)
            .map(|s| s.quantity)
            .unwrap()
    }

    #[test]
    fn test_place_order_copies_cart_and_decrements_stock() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 2)?;
        f.db.add_to_cart(f.user_id, f.shirt_id, "M", 1)?;

        let checkout = f.db.place_order(f.user_id, None)?;
        assert!(!checkout.replayed);
        let order = &checkout.order;
        assert_eq!(order.order.status, OrderStatus::Pending);
        assert_eq!(order.order.total_cents, 2 * 10000 + 2500);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].unit_price_cents, 10000);
        assert_eq!(order.items[0].quantity, 2);

        assert_eq!(quantity(&f.db, f.shoe_id, "42"), 3);
        assert_eq!(quantity(&f.db, f.shirt_id, "M"), 1);
        assert_eq!(checkout.stock.len(), 2);
        assert!(f.db.get_cart(f.user_id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_order_items_keep_price_at_checkout() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let order_id = f.db.place_order(f.user_id, None)?.order.order.id;

        f.db.update_product(
            f.shoe_id,
            &crate::shop::db::ProductPatch {
                price_cents: Some(1),
                ..Default::default()
            },
        )?;
        let detail = f.db.get_order_detail(order_id)?.expect("order");
        assert_eq!(detail.items[0].unit_price_cents, 10000);
        assert_eq!(detail.order.total_cents, 10000);
        Ok(())
    }

    #[test]
    fn test_empty_cart_is_rejected() -> Result<()> {
        let f = fixture()?;
        let err = f.db.place_order(f.user_id, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::EmptyCart { .. })
        ));
        assert!(f.db.list_orders(None)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_insufficient_stock_rolls_back_everything() -> Result<()> {
        let f = fixture()?;
        // First line would succeed, second cannot.
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 2)?;
        f.db.add_to_cart(f.user_id, f.shirt_id, "M", 3)?;

        let err = f.db.place_order(f.user_id, None).unwrap_err();
        match err.downcast_ref::<ShopError>() {
            Some(ShopError::InsufficientStock {
                product_id,
                size,
                requested,
                available,
            }) => {
                assert_eq!(*product_id, f.shirt_id);
                assert_eq!(size, "M");
                assert_eq!(*requested, 3);
                assert_eq!(*available, 2);
            }
            other => panic!("Expected InsufficientStock, got {:?}", other),
        }

        assert_eq!(quantity(&f.db, f.shoe_id, "42"), 5);
        assert_eq!(quantity(&f.db, f.shirt_id, "M"), 2);
        assert!(f.db.list_orders(None)?.is_empty());
        let order_items: i64 =
            f.db.conn
                .query_row("SELECT COUNT(*) FROM order_items", [], |row| row.get(0))?;
        assert_eq!(order_items, 0);
        assert_eq!(f.db.get_cart(f.user_id)?.lines.len(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_size_counts_as_zero_available() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "47", 1)?;
        let err = f.db.place_order(f.user_id, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::InsufficientStock { available: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_idempotency_key_replays_first_order() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let first = f.db.place_order(f.user_id, Some("attempt-1"))?;
        assert!(!first.replayed);

        // Re-submitting the same attempt must not touch the new cart.
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let second = f.db.place_order(f.user_id, Some("attempt-1"))?;
        assert!(second.replayed);
        assert_eq!(second.order.order.id, first.order.order.id);
        assert_eq!(quantity(&f.db, f.shoe_id, "42"), 4);
        assert_eq!(f.db.get_cart(f.user_id)?.lines.len(), 1);

        let third = f.db.place_order(f.user_id, Some("attempt-2"))?;
        assert!(!third.replayed);
        assert_ne!(third.order.order.id, first.order.order.id);
        assert_eq!(f.db.list_user_orders(f.user_id)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_blank_idempotency_key_is_ignored() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let checkout = f.db.place_order(f.user_id, Some("   "))?;
        assert!(checkout.order.order.idempotency_key.is_none());
        Ok(())
    }

    #[test]
    fn test_place_order_for_unknown_user() -> Result<()> {
        let f = fixture()?;
        let err = f.db.place_order(999, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::UserNotFound { id: 999 })
        ));
        Ok(())
    }

    #[test]
    fn test_order_status_transitions() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let id = f.db.place_order(f.user_id, None)?.order.order.id;

        let skip = f.db.update_order_status(id, OrderStatus::Delivered).unwrap_err();
        assert!(matches!(
            skip.downcast_ref::<ShopError>(),
            Some(ShopError::InvalidTransition { .. })
        ));

        let (from, shipped) = f.db.update_order_status(id, OrderStatus::Shipped)?;
        assert_eq!(from, OrderStatus::Pending);
        assert_eq!(shipped.status, OrderStatus::Shipped);

        let (from, delivered) = f.db.update_order_status(id, OrderStatus::Delivered)?;
        assert_eq!(from, OrderStatus::Shipped);
        assert_eq!(delivered.status, OrderStatus::Delivered);

        assert!(f.db.update_order_status(id, OrderStatus::Pending).is_err());
        assert!(f.db.update_order_status(4242, OrderStatus::Shipped).is_err());
        Ok(())
    }

    #[test]
    fn test_list_orders_by_status_newest_first() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let first = f.db.place_order(f.user_id, None)?.order.order.id;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        let second = f.db.place_order(f.user_id, None)?.order.order.id;
        f.db.update_order_status(first, OrderStatus::Shipped)?;

        let all = f.db.list_orders(None)?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].order.id, second);

        let shipped = f.db.list_orders(Some(OrderStatus::Shipped))?;
        assert_eq!(shipped.len(), 1);
        assert_eq!(shipped[0].order.id, first);
        assert_eq!(shipped[0].items.len(), 1);
        Ok(())
    }

    #[test]
    fn test_ordered_product_cannot_be_deleted() -> Result<()> {
        let f = fixture()?;
        f.db.add_to_cart(f.user_id, f.shoe_id, "42", 1)?;
        f.db.place_order(f.user_id, None)?;
        let err = f.db.delete_product(f.shoe_id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::ProductInUse { .. })
        ));
        assert!(f.db.delete_product(f.shirt_id)?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_cannot_oversell() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let first = db.create_user("First", "first@example.com", "pw")?;
        let second = db.create_user("Second", "second@example.com", "pw")?;
        let ball = db.create_product(&new_product("Final Ball", "football", 15000))?;
        let row = db.upsert_stock(ball.id, "5", 1)?;
        db.add_to_cart(first.id, ball.id, "5", 1)?;
        db.add_to_cart(second.id, ball.id, "5", 1)?;

        let handle = crate::shop::db::DbHandle::new(db);
        let (a, b) = tokio::join!(
            handle.call(move |db| db.place_order(first.id, None)),
            handle.call(move |db| db.place_order(second.id, None)),
        );

        let results = [a, b];
        let placed = results.iter().filter(|r| r.is_ok()).count();
        let oversold = results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .filter(|e| {
                matches!(
                    e.downcast_ref::<ShopError>(),
                    Some(ShopError::InsufficientStock { available: 0, .. })
                )
            })
            .count();
        assert_eq!(placed, 1);
        assert_eq!(oversold, 1);

        let remaining = handle
            .call(move |db| db.get_stock(row.id))
            .await?
            .expect("stock row");
        assert_eq!(remaining.quantity, 0);
        Ok(())
    }
}
