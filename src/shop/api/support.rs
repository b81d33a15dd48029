use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sportshub_common::TicketStatus;

use super::orders::{StatusQuery, StatusRequest};
use super::{ApiError, SharedState, parse_status};
use crate::shop::ws::{WsMessage, broadcast_message};

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub message: String,
}

#[derive(Deserialize)]
pub struct CreateResponseRequest {
    pub author_id: i64,
    pub message: String,
}

pub(super) async fn create_ticket(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .db
        .call(move |db| db.create_ticket(user_id, &req.subject, &req.message))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketOpened {
            ticket: ticket.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub(super) async fn list_user_tickets(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state
        .db
        .call(move |db| db.list_user_tickets(user_id))
        .await?;
    Ok(Json(tickets))
}

pub(super) async fn list_tickets(
    State(state): State<SharedState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(parse_status::<TicketStatus>)
        .transpose()?;
    let tickets = state.db.call(move |db| db.list_tickets(status)).await?;
    Ok(Json(tickets))
}

pub(super) async fn get_ticket(
    State(state): State<SharedState>,
    Path(ticket_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .db
        .call(move |db| db.get_ticket_detail(ticket_id))
        .await?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound(format!("Help ticket {} not found", ticket_id))),
    }
}

pub(super) async fn add_response(
    State(state): State<SharedState>,
    Path(ticket_id): Path<i64>,
    Json(req): Json<CreateResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .db
        .call(move |db| db.add_ticket_response(ticket_id, req.author_id, &req.message))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketResponded {
            response: response.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(response)))
}

pub(super) async fn set_ticket_status(
    State(state): State<SharedState>,
    Path(ticket_id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let next: TicketStatus = parse_status(&req.status)?;
    let (from, ticket) = state
        .db
        .call(move |db| db.set_ticket_status(ticket_id, next))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketStatusChanged {
            ticket_id,
            from_status: from.to_string(),
            to_status: next.to_string(),
        },
    );
    Ok(Json(ticket))
}
