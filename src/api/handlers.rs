//! REST surface for queue operations. Handlers translate transport concerns
//! (paths, headers, bodies) and leave the semantics to the manager; error
//! kinds become status codes in one place, the `RelayError` responder.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::error::{RelayError, Result};
use crate::queue::{ReceiveMessagesResponse, SendMessageRequest};
use crate::server::middleware::extract_bearer_token;
use crate::server::AppState;
use crate::ws::ServerFrame;

#[derive(Debug, Deserialize)]
pub struct ReceiveQuery {
    pub since: Option<String>,
    pub limit: Option<usize>,
}

#[tracing::instrument(name = "http.create_queue", skip(state))]
pub async fn create_queue(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let created = state.manager.create_queue().await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(name = "http.send_message", skip(state, body), fields(queue_id = %handle))]
pub async fn send_message(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    body: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = body.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let payload = request.payload;

    let receipt = state.manager.append(&handle, payload.clone()).await?;

    // Out-of-band fan-out to live subscribers; polling remains authoritative
    // and a delivery problem never fails the send.
    let delivered = state.registry.broadcast(
        &handle,
        ServerFrame::message(&handle, &receipt.message_id, payload),
    );
    if delivered > 0 {
        tracing::debug!(queue_id = %handle, delivered, "notified live subscribers");
    }

    Ok((StatusCode::CREATED, Json(receipt)))
}

#[tracing::instrument(name = "http.receive_messages", skip(state, headers), fields(queue_id = %handle))]
pub async fn receive_messages(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Query(query): Query<ReceiveQuery>,
    headers: HeaderMap,
) -> Result<Json<ReceiveMessagesResponse>> {
    let token = extract_bearer_token(&headers).ok_or(RelayError::InvalidAccessToken)?;

    let window = state
        .manager
        .window(&handle, &token, query.since.as_deref(), query.limit)
        .await?;

    Ok(Json(window))
}

#[tracing::instrument(name = "http.delete_queue", skip(state, headers), fields(queue_id = %handle))]
pub async fn delete_queue(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let token = extract_bearer_token(&headers).ok_or(RelayError::InvalidAccessToken)?;

    state.manager.delete_queue(&handle, &token).await?;

    Ok(StatusCode::NO_CONTENT)
}
