use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use events::{EventBus, EventEnvelope};
use orchestrator::PlanService;
use pathfinder_core::PlanRequest;

use crate::messages::{ClientMessage, ServerMessage, SubscriptionFilter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub service: PlanService,
    pub event_bus: EventBus,
}

impl WsState {
    pub fn new(service: PlanService, event_bus: EventBus) -> Self {
        Self { service, event_bus }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send one message. Returns false once the socket is gone.
async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode WebSocket message: {}", e);
            true
        }
    }
}

/// Validate and start a plan whose progress goes to `progress`.
fn start_plan(
    service: &PlanService,
    request: PlanRequest,
    progress: mpsc::UnboundedSender<EventEnvelope>,
) -> Result<JoinHandle<()>, ServerMessage> {
    if let Err(e) = request.validate() {
        return Err(ServerMessage::Rejected {
            field: e.field().map(str::to_string),
            message: e.to_string(),
        });
    }
    let service = service.clone();
    Ok(tokio::spawn(async move {
        if let Err(e) = service.plan_streaming(request, progress).await {
            warn!("Streaming plan failed: {}", e);
        }
    }))
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut event_rx = state.event_bus.subscribe();
    let mut filter: Option<SubscriptionFilter> = None;
    let mut subscribed = false;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<EventEnvelope>();
    let mut running: Option<JoinHandle<()>> = None;

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !send(&mut sender, &ServerMessage::Pong).await {
                    break;
                }
            }

            Some(envelope) = progress_rx.recv() => {
                if !send(&mut sender, &ServerMessage::for_own_request(envelope)).await {
                    break;
                }
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Ok(envelope) => {
                        if subscribed {
                            let should_send = filter.as_ref()
                                .map(|f| f.matches(&envelope))
                                .unwrap_or(true);

                            if should_send && !send(&mut sender, &ServerMessage::Event { envelope }).await {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            msg = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Plan { request }) => {
                                if running.as_ref().map_or(false, |h| !h.is_finished()) {
                                    Some(ServerMessage::Error {
                                        message: "A plan is already running on this connection".to_string(),
                                    })
                                } else {
                                    match start_plan(&state.service, request, progress_tx.clone()) {
                                        Ok(handle) => {
                                            running = Some(handle);
                                            None
                                        }
                                        Err(rejected) => Some(rejected),
                                    }
                                }
                            }
                            Ok(ClientMessage::Subscribe { filter: new_filter }) => {
                                filter = new_filter.clone();
                                subscribed = true;
                                Some(ServerMessage::Subscribed { filter: new_filter })
                            }
                            Ok(ClientMessage::Unsubscribe) => {
                                subscribed = false;
                                filter = None;
                                Some(ServerMessage::Unsubscribed)
                            }
                            Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),
                            Err(e) => Some(ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            }),
                        };
                        if let Some(response) = response {
                            if !send(&mut sender, &response).await {
                                break;
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        break;
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => {
                        break;
                    }
                    Ok(None) => {
                        break;
                    }
                    Err(_) => {
                        debug!("WebSocket client timeout, sending ping");
                    }
                }
            }
        }
    }

    // A disconnect cancels the in-flight plan and every outstanding call.
    if let Some(handle) = running {
        handle.abort();
    }
    debug!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator::{Capabilities, PipelineConfig};

    fn service() -> PlanService {
        PlanService::new(Capabilities::unconfigured(), PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_ws_state_creation() {
        let bus = EventBus::new();
        let state = WsState::new(service(), bus);
        assert_eq!(state.event_bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_plan_rejected_without_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let rejected = start_plan(&service(), PlanRequest::new("   "), tx).unwrap_err();

        let ServerMessage::Rejected { field, .. } = rejected else {
            panic!("expected rejection");
        };
        assert_eq!(field.as_deref(), Some("prompt"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_started_plan_streams_to_terminal_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = start_plan(&service(), PlanRequest::new("bowling"), tx).unwrap();
        handle.await.unwrap();

        let mut last = None;
        while let Some(envelope) = rx.recv().await {
            last = Some(ServerMessage::for_own_request(envelope));
        }
        assert!(matches!(last, Some(ServerMessage::Result { .. })));
    }

    #[test]
    fn test_heartbeat_interval() {
        assert_eq!(HEARTBEAT_INTERVAL, Duration::from_secs(30));
        assert_eq!(CLIENT_TIMEOUT, Duration::from_secs(10));
    }
}
