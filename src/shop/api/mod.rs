use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use tokio::sync::broadcast;

use super::db::DbHandle;
use crate::errors::ShopError;

mod catalog;
mod orders;
mod support;
mod users;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle) -> Self {
        let (ws_tx, _) = broadcast::channel(256);
        Self { db, ws_tx }
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

/// Store errors carry a `ShopError` when the failure is the caller's fault;
/// anything else is a 500.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ShopError>() {
            Some(shop) => {
                let msg = shop.to_string();
                if shop.is_not_found() {
                    ApiError::NotFound(msg)
                } else if shop.is_conflict() {
                    ApiError::Conflict(msg)
                } else {
                    match shop {
                        ShopError::InvalidCredentials => ApiError::Unauthorized(msg),
                        ShopError::Validation(_) | ShopError::EmptyCart { .. } => {
                            ApiError::BadRequest(msg)
                        }
                        _ => ApiError::Internal(msg),
                    }
                }
            }
            None => ApiError::Internal(format!("{:#}", err)),
        }
    }
}

/// Parse a status string from a request body or query into its enum.
fn parse_status<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, ApiError> {
    raw.parse::<T>().map_err(ApiError::BadRequest)
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        // users
        .route("/api/users", get(users::list_users).post(users::register))
        .route("/api/users/login", post(users::login))
        .route(
            "/api/users/{user_id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/api/users/{user_id}/preferences",
            patch(users::update_preferences),
        )
        // catalog
        .route(
            "/api/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/api/products/{product_id}",
            get(catalog::get_product)
                .patch(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route(
            "/api/products/{product_id}/stock",
            get(catalog::list_stock).put(catalog::upsert_stock),
        )
        .route(
            "/api/stock/{stock_id}",
            patch(catalog::set_stock_quantity).delete(catalog::delete_stock),
        )
        .route(
            "/api/products/{product_id}/reviews",
            get(catalog::list_product_reviews).post(catalog::create_review),
        )
        .route("/api/users/{user_id}/reviews", get(catalog::list_user_reviews))
        .route(
            "/api/reviews/{review_id}",
            patch(catalog::update_review).delete(catalog::delete_review),
        )
        // cart and orders
        .route(
            "/api/users/{user_id}/cart",
            get(orders::get_cart)
                .post(orders::add_to_cart)
                .delete(orders::clear_cart),
        )
        .route(
            "/api/users/{user_id}/cart/{item_id}",
            patch(orders::set_cart_quantity).delete(orders::remove_cart_item),
        )
        .route(
            "/api/users/{user_id}/orders",
            get(orders::list_user_orders).post(orders::place_order),
        )
        .route("/api/orders", get(orders::list_orders))
        .route("/api/orders/{order_id}", get(orders::get_order))
        .route(
            "/api/orders/{order_id}/status",
            patch(orders::update_order_status),
        )
        // help tickets
        .route(
            "/api/users/{user_id}/tickets",
            get(support::list_user_tickets).post(support::create_ticket),
        )
        .route("/api/tickets", get(support::list_tickets))
        .route("/api/tickets/{ticket_id}", get(support::get_ticket))
        .route(
            "/api/tickets/{ticket_id}/responses",
            post(support::add_response),
        )
        .route(
            "/api/tickets/{ticket_id}/status",
            patch(support::set_ticket_status),
        )
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "ok"
}
