//! SQLite store for the shop.
//!
//! `ShopDb` owns a single rusqlite connection. Every query goes through that
//! one connection, and `DbHandle` wraps it in a mutex, so writes are
//! serialized. Multi-row writes (checkout, user updates) run inside a
//! transaction so a failure leaves nothing half-applied.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::debug;

use crate::errors::ShopError;

mod cart;
mod orders;
mod products;
mod reviews;
mod tickets;
mod users;

pub use orders::Checkout;
pub use products::{NewProduct, ProductFilter, ProductPatch};
pub use users::{PreferencesPatch, UserPatch};

/// Async-safe handle to the shop database.
///
/// Runs all access on tokio's blocking thread pool via `spawn_blocking`, so
/// synchronous SQLite I/O never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ShopDb>>,
}

impl DbHandle {
    pub fn new(db: ShopDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ShopDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| ShopError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct ShopDb {
    conn: Connection,
}

impl ShopDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        debug!(path = %path.display(), "shop database ready");
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    password_salt TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'customer',
                    newsletter INTEGER NOT NULL DEFAULT 0,
                    order_updates INTEGER NOT NULL DEFAULT 1,
                    promotions INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    brand TEXT NOT NULL DEFAULT '',
                    category TEXT NOT NULL,
                    price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
                    image_url TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS stock (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                    size TEXT NOT NULL,
                    quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
                    UNIQUE(product_id, size)
                );

                CREATE TABLE IF NOT EXISTS cart_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                    size TEXT NOT NULL,
                    quantity INTEGER NOT NULL CHECK (quantity > 0),
                    added_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(user_id, product_id, size)
                );

                CREATE TABLE IF NOT EXISTS orders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    status TEXT NOT NULL DEFAULT 'pending',
                    total_cents INTEGER NOT NULL DEFAULT 0,
                    idempotency_key TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS order_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                    product_id INTEGER NOT NULL REFERENCES products(id),
                    size TEXT NOT NULL,
                    quantity INTEGER NOT NULL CHECK (quantity > 0),
                    unit_price_cents INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS reviews (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                    comment TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(user_id, product_id)
                );

                CREATE TABLE IF NOT EXISTS help_tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    subject TEXT NOT NULL,
                    message TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS ticket_responses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES help_tickets(id) ON DELETE CASCADE,
                    author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
                CREATE INDEX IF NOT EXISTS idx_stock_product ON stock(product_id);
                CREATE INDEX IF NOT EXISTS idx_cart_items_user ON cart_items(user_id);
                CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
                CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);
                CREATE INDEX IF NOT EXISTS idx_order_items_product ON order_items(product_id);
                CREATE INDEX IF NOT EXISTS idx_reviews_product ON reviews(product_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_user ON help_tickets(user_id);
                CREATE INDEX IF NOT EXISTS idx_ticket_responses_ticket ON ticket_responses(ticket_id);
                ",
            )
            .context("Failed to create tables")?;

        self.conn
            .execute_batch(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_idempotency
                 ON orders(user_id, idempotency_key)
                 WHERE idempotency_key IS NOT NULL;",
            )
            .context("Failed to create idempotency index")?;

        Ok(())
    }
}

/// Largest quantity a cart line or stock row may hold.
pub const MAX_QUANTITY: i64 = 100_000;

/// Bounds check shared by cart and stock quantities. `min` is the smallest
/// accepted value (1 for cart lines, 0 for stock rows).
fn check_quantity(quantity: i64, min: i64) -> Result<()> {
    if quantity < min {
        return Err(ShopError::validation(format!("quantity must be at least {}", min)).into());
    }
    if quantity > MAX_QUANTITY {
        return Err(
            ShopError::validation(format!("quantity must be at most {}", MAX_QUANTITY)).into(),
        );
    }
    Ok(())
}

/// Reject empty strings after trimming; returns the trimmed value.
fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ShopError::validation(format!("{} is required", field)).into());
    }
    Ok(trimmed.to_string())
}
