use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::api;
use crate::ws::ws_handler;

use super::middleware::{cors, request_timeout};
use super::AppState;

/// Request body cap for the queue routes. Generous enough for a maximum
/// payload in either accepted wire encoding (a JSON octet array inflates
/// roughly fivefold over the raw bytes), tight enough to bound decode work.
const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let queue_routes = Router::new()
        .route("/queue/create", post(api::create_queue))
        .route("/queue/{handle}/send", post(api::send_message))
        .route("/queue/{handle}/receive", get(api::receive_messages))
        .route("/queue/{handle}", delete(api::delete_queue))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES));

    Router::new()
        .route("/health", get(api::health))
        .route("/ws", get(ws_handler))
        .merge(queue_routes)
        .layer(middleware::from_fn_with_state(state.clone(), request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors))
        .with_state(state)
}
