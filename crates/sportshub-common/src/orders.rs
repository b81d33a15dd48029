use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub size: String,
    pub quantity: i64,
    pub added_at: String,
}

/// A cart item priced at the product's current price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub user_id: i64,
    pub lines: Vec<CartLine>,
    pub total_cents: i64,
}

impl CartLine {
    /// Price a cart item. `None` when the line total does not fit in an i64.
    pub fn priced(item: CartItem, product_name: String, unit_price_cents: i64) -> Option<Self> {
        let line_total_cents = unit_price_cents.checked_mul(item.quantity)?;
        Some(Self {
            item,
            product_name,
            unit_price_cents,
            line_total_cents,
        })
    }
}

impl CartView {
    /// Sum the lines into a cart. `None` when the total overflows.
    pub fn from_lines(user_id: i64, lines: Vec<CartLine>) -> Option<Self> {
        let total_cents = lines
            .iter()
            .try_fold(0i64, |acc, l| acc.checked_add(l.line_total_cents))?;
        Some(Self {
            user_id,
            lines,
            total_cents,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
        }
    }

    /// Orders only move forward one step at a time.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Shipped) | (Self::Shipped, Self::Delivered)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub idempotency_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Snapshot of one cart line at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub size: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}
