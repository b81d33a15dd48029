use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState};
use crate::shop::db::{NewProduct, ProductFilter, ProductPatch};
use crate::shop::ws::{WsMessage, broadcast_message};

#[derive(Deserialize)]
pub struct StockRequest {
    pub size: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct StockQuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct CreateReviewRequest {
    pub user_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

// ── Products ──────────────────────────────────────────────────────────

pub(super) async fn list_products(
    State(state): State<SharedState>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state.db.call(move |db| db.list_products(&filter)).await?;
    Ok(Json(products))
}

pub(super) async fn create_product(
    State(state): State<SharedState>,
    Json(req): Json<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.db.call(move |db| db.create_product(&req)).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ProductCreated {
            product: product.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(product)))
}

pub(super) async fn get_product(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .db
        .call(move |db| db.get_product_detail(product_id))
        .await?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound(format!("Product {} not found", product_id))),
    }
}

pub(super) async fn update_product(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
    Json(patch): Json<ProductPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .db
        .call(move |db| db.update_product(product_id, &patch))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ProductUpdated {
            product: product.clone(),
        },
    );
    Ok(Json(product))
}

pub(super) async fn delete_product(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_product(product_id))
        .await?;
    match deleted {
        true => {
            broadcast_message(&state.ws_tx, &WsMessage::ProductDeleted { product_id });
            Ok(StatusCode::NO_CONTENT)
        }
        false => Err(ApiError::NotFound(format!("Product {} not found", product_id))),
    }
}

// ── Stock ─────────────────────────────────────────────────────────────

pub(super) async fn list_stock(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let stock = state
        .db
        .call(move |db| {
            db.require_product(product_id)?;
            db.list_stock(product_id)
        })
        .await?;
    Ok(Json(stock))
}

pub(super) async fn upsert_stock(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
    Json(req): Json<StockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stock = state
        .db
        .call(move |db| db.upsert_stock(product_id, &req.size, req.quantity))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::StockChanged {
            stock: stock.clone(),
        },
    );
    Ok(Json(stock))
}

pub(super) async fn set_stock_quantity(
    State(state): State<SharedState>,
    Path(stock_id): Path<i64>,
    Json(req): Json<StockQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stock = state
        .db
        .call(move |db| db.set_stock_quantity(stock_id, req.quantity))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::StockChanged {
            stock: stock.clone(),
        },
    );
    Ok(Json(stock))
}

pub(super) async fn delete_stock(
    State(state): State<SharedState>,
    Path(stock_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .db
        .call(move |db| {
            let Some(stock) = db.get_stock(stock_id)? else {
                return Ok(None);
            };
            db.delete_stock(stock_id)?;
            Ok(Some(stock.product_id))
        })
        .await?;
    match removed {
        Some(product_id) => {
            broadcast_message(
                &state.ws_tx,
                &WsMessage::StockDeleted {
                    stock_id,
                    product_id,
                },
            );
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound(format!("Stock row {} not found", stock_id))),
    }
}

// ── Reviews ───────────────────────────────────────────────────────────

pub(super) async fn list_product_reviews(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reviews = state
        .db
        .call(move |db| db.list_product_reviews(product_id))
        .await?;
    Ok(Json(reviews))
}

pub(super) async fn create_review(
    State(state): State<SharedState>,
    Path(product_id): Path<i64>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = req.comment.unwrap_or_default();
    let review = state
        .db
        .call(move |db| db.create_review(product_id, req.user_id, req.rating, &comment))
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub(super) async fn list_user_reviews(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reviews = state
        .db
        .call(move |db| db.list_user_reviews(user_id))
        .await?;
    Ok(Json(reviews))
}

pub(super) async fn update_review(
    State(state): State<SharedState>,
    Path(review_id): Path<i64>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let review = state
        .db
        .call(move |db| db.update_review(review_id, req.rating, req.comment.as_deref()))
        .await?;
    Ok(Json(review))
}

pub(super) async fn delete_review(
    State(state): State<SharedState>,
    Path(review_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_review(review_id))
        .await?;
    match deleted {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Review {} not found", review_id))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_create_and_filter_products() {
        let state = test_state();
        for (name, brand, category) in [
            ("Pro Racket", "Volt", "tennis"),
            ("Court Shoe", "Volt", "tennis"),
            ("Match Ball", "Kick", "football"),
        ] {
            let response = send(
                &state,
                "POST",
                "/api/products",
                Some(json!({
                    "name": name,
                    "brand": brand,
                    "category": category,
                    "price_cents": 1000,
                })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = send(&state, "GET", "/api/products?category=tennis", None).await;
        let products: Vec<Value> = body_json(response.into_body()).await;
        assert_eq!(products.len(), 2);

        let response = send(&state, "GET", "/api/products?search=BALL", None).await;
        let products: Vec<Value> = body_json(response.into_body()).await;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["name"], "Match Ball");

        let response = send(&state, "GET", "/api/products", None).await;
        let products: Vec<Value> = body_json(response.into_body()).await;
        assert_eq!(products.len(), 3);
    }

    #[tokio::test]
    async fn test_create_product_rejects_negative_price() {
        let state = test_state();
        let response = send(
            &state,
            "POST",
            "/api/products",
            Some(json!({"name": "Free", "category": "x", "price_cents": -1})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_product_detail_and_stock() {
        let state = test_state();
        let id = stocked_product(&state, "Boot", 12000, "43", 4).await;
        send(
            &state,
            "PUT",
            &format!("/api/products/{}/stock", id),
            Some(json!({"size": "41", "quantity": 2})),
        )
        .await;

        let response = send(&state, "GET", &format!("/api/products/{}", id), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let detail: Value = body_json(response.into_body()).await;
        assert_eq!(detail["name"], "Boot");
        assert_eq!(detail["stock"].as_array().unwrap().len(), 2);
        assert_eq!(detail["stock"][0]["size"], "41");
        assert_eq!(detail["review_count"], 0);
        assert!(detail["average_rating"].is_null());

        let response = send(&state, "GET", "/api/products/999", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&state, "GET", "/api/products/999/stock", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stock_patch_and_delete() {
        let state = test_state();
        let id = stocked_product(&state, "Cap", 1500, "one", 10).await;
        let response = send(&state, "GET", &format!("/api/products/{}/stock", id), None).await;
        let rows: Vec<Value> = body_json(response.into_body()).await;
        let stock_id = rows[0]["id"].as_i64().unwrap();

        let response = send(
            &state,
            "PATCH",
            &format!("/api/stock/{}", stock_id),
            Some(json!({"quantity": 3})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let row: Value = body_json(response.into_body()).await;
        assert_eq!(row["quantity"], 3);

        let response = send(
            &state,
            "PATCH",
            &format!("/api/stock/{}", stock_id),
            Some(json!({"quantity": -3})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&state, "DELETE", &format!("/api/stock/{}", stock_id), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&state, "DELETE", &format!("/api/stock/{}", stock_id), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_product_changes_are_broadcast() {
        let state = test_state();
        let mut rx = state.ws_tx.subscribe();
        let id = stocked_product(&state, "Net", 5000, "std", 1).await;

        let created = rx.recv().await.unwrap();
        assert!(created.contains("\"type\":\"ProductCreated\""));
        let stock = rx.recv().await.unwrap();
        assert!(stock.contains("\"type\":\"StockChanged\""));

        send(&state, "DELETE", &format!("/api/products/{}", id), None).await;
        let deleted = rx.recv().await.unwrap();
        assert!(deleted.contains("\"type\":\"ProductDeleted\""));
    }

    #[tokio::test]
    async fn test_update_and_delete_product() {
        let state = test_state();
        let id = stocked_product(&state, "Old Name", 100, "M", 1).await;
        let response = send(
            &state,
            "PATCH",
            &format!("/api/products/{}", id),
            Some(json!({"name": "New Name", "price_cents": 250})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let product: Value = body_json(response.into_body()).await;
        assert_eq!(product["name"], "New Name");
        assert_eq!(product["price_cents"], 250);

        let response = send(&state, "DELETE", &format!("/api/products/{}", id), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&state, "DELETE", &format!("/api/products/{}", id), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reviews_flow() {
        let state = test_state();
        let user = register(&state, "reviewer@example.com").await;
        let product = stocked_product(&state, "Helmet", 4000, "M", 1).await;
        let uri = format!("/api/products/{}/reviews", product);

        let response = send(
            &state,
            "POST",
            &uri,
            Some(json!({"user_id": user, "rating": 6})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &state,
            "POST",
            &uri,
            Some(json!({"user_id": user, "rating": 4, "comment": "Solid"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let review: Value = body_json(response.into_body()).await;
        let review_id = review["id"].as_i64().unwrap();

        let response = send(
            &state,
            "POST",
            &uri,
            Some(json!({"user_id": user, "rating": 5})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &state,
            "POST",
            &uri,
            Some(json!({"user_id": 9999, "rating": 5})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &state,
            "PATCH",
            &format!("/api/reviews/{}", review_id),
            Some(json!({"rating": 2})),
        )
        .await;
        let updated: Value = body_json(response.into_body()).await;
        assert_eq!(updated["rating"], 2);
        assert_eq!(updated["comment"], "Solid");

        let response = send(&state, "GET", &format!("/api/products/{}", product), None).await;
        let detail: Value = body_json(response.into_body()).await;
        assert_eq!(detail["review_count"], 1);
        assert_eq!(detail["average_rating"], 2.0);

        let response = send(&state, "GET", &format!("/api/users/{}/reviews", user), None).await;
        let mine: Vec<Value> = body_json(response.into_body()).await;
        assert_eq!(mine.len(), 1);

        let response = send(&state, "DELETE", &format!("/api/reviews/{}", review_id), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&state, "GET", &uri, None).await;
        let reviews: Vec<Value> = body_json(response.into_body()).await;
        assert!(reviews.is_empty());
    }
}
