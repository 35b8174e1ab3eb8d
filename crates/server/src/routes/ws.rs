use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use websocket::WsState;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/plan/ws",
    responses(
        (status = 101, description = "WebSocket upgrade for streaming plans")
    ),
    tag = "plan"
)]
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let ws_state = Arc::new(WsState::new(state.service.clone(), state.event_bus.clone()));
    websocket::ws_handler(ws, State(ws_state)).await
}
