use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use sportshub_common::OrderStatus;

use super::{ApiError, SharedState, parse_status};
use crate::shop::ws::{WsMessage, broadcast_message};

/// Header a client sets to make a checkout retry-safe.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Deserialize)]
pub struct AddToCartRequest {
    pub product_id: i64,
    pub size: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct CartQuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

// ── Cart ──────────────────────────────────────────────────────────────

pub(super) async fn get_cart(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.db.call(move |db| db.get_cart(user_id)).await?;
    Ok(Json(cart))
}

pub(super) async fn add_to_cart(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Json(req): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .db
        .call(move |db| db.add_to_cart(user_id, req.product_id, &req.size, req.quantity))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub(super) async fn set_cart_quantity(
    State(state): State<SharedState>,
    Path((user_id, item_id)): Path<(i64, i64)>,
    Json(req): Json<CartQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .db
        .call(move |db| db.set_cart_quantity(user_id, item_id, req.quantity))
        .await?;
    Ok(Json(item))
}

pub(super) async fn remove_cart_item(
    State(state): State<SharedState>,
    Path((user_id, item_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .db
        .call(move |db| db.remove_cart_item(user_id, item_id))
        .await?;
    match removed {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Cart item {} not found", item_id))),
    }
}

pub(super) async fn clear_cart(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.call(move |db| db.clear_cart(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Orders ────────────────────────────────────────────────────────────

pub(super) async fn place_order(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".into()))?
                .to_string(),
        ),
        None => None,
    };
    let checkout = state
        .db
        .call(move |db| db.place_order(user_id, key.as_deref()))
        .await?;

    if checkout.replayed {
        return Ok((StatusCode::OK, Json(checkout.order)));
    }
    for stock in &checkout.stock {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::StockChanged {
                stock: stock.clone(),
            },
        );
    }
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderPlaced {
            order: checkout.order.order.clone(),
            item_count: checkout.order.items.len(),
        },
    );
    Ok((StatusCode::CREATED, Json(checkout.order)))
}

pub(super) async fn list_user_orders(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state.db.call(move |db| db.list_user_orders(user_id)).await?;
    Ok(Json(orders))
}

pub(super) async fn list_orders(
    State(state): State<SharedState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(parse_status::<OrderStatus>)
        .transpose()?;
    let orders = state.db.call(move |db| db.list_orders(status)).await?;
    Ok(Json(orders))
}

pub(super) async fn get_order(
    State(state): State<SharedState>,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .db
        .call(move |db| db.get_order_detail(order_id))
        .await?;
    match order {
        Some(order) => Ok(Json(order)),
        None => Err(ApiError::NotFound(format!("Order {} not found", order_id))),
    }
}

pub(super) async fn update_order_status(
    State(state): State<SharedState>,
    Path(order_id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let next: OrderStatus = parse_status(&req.status)?;
    let (from, order) = state
        .db
        .call(move |db| db.update_order_status(order_id, next))
        .await?;
    tracing::info!(order_id, from = %from, to = %next, "order status changed");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderStatusChanged {
            order_id,
            from_status: from.to_string(),
            to_status: next.to_string(),
        },
    );
    Ok(Json(order))
}
