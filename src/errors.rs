//! Typed error hierarchy for the SportsHub store.
//!
//! `ShopError` carries domain failures out of the store layer. Store methods
//! return `anyhow::Result`, so a `ShopError` travels inside the anyhow chain
//! and the HTTP layer downcasts it to pick a status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("User {id} not found")]
    UserNotFound { id: i64 },

    #[error("No user registered with email {email}")]
    UserEmailNotFound { email: String },

    #[error("Product {id} not found")]
    ProductNotFound { id: i64 },

    #[error("Stock row {id} not found")]
    StockNotFound { id: i64 },

    #[error("Cart item {id} not found")]
    CartItemNotFound { id: i64 },

    #[error("Order {id} not found")]
    OrderNotFound { id: i64 },

    #[error("Review {id} not found")]
    ReviewNotFound { id: i64 },

    #[error("Help ticket {id} not found")]
    TicketNotFound { id: i64 },

    #[error("Email {email} is already registered")]
    EmailTaken { email: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Cart for user {user_id} is empty")]
    EmptyCart { user_id: i64 },

    #[error(
        "Insufficient stock for product {product_id} size {size}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: i64,
        size: String,
        requested: i64,
        available: i64,
    },

    #[error("Cannot move order {order_id} from {from} to {to}")]
    InvalidTransition {
        order_id: i64,
        from: String,
        to: String,
    },

    #[error("User {user_id} has already reviewed product {product_id}")]
    DuplicateReview { user_id: i64, product_id: i64 },

    #[error("Help ticket {id} is closed")]
    TicketClosed { id: i64 },

    #[error("Product {id} appears in existing orders and cannot be deleted")]
    ProductInUse { id: i64 },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl ShopError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound { .. }
                | Self::UserEmailNotFound { .. }
                | Self::ProductNotFound { .. }
                | Self::StockNotFound { .. }
                | Self::CartItemNotFound { .. }
                | Self::OrderNotFound { .. }
                | Self::ReviewNotFound { .. }
                | Self::TicketNotFound { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::EmailTaken { .. }
                | Self::InsufficientStock { .. }
                | Self::InvalidTransition { .. }
                | Self::DuplicateReview { .. }
                | Self::TicketClosed { .. }
                | Self::ProductInUse { .. }
        )
    }
}
