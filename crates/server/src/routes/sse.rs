use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use events::EventEnvelope;

use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated request ids
    pub request_ids: Option<String>,
}

fn parse_request_ids(request_ids: Option<&str>) -> Option<Vec<Uuid>> {
    request_ids.map(|s| {
        s.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    })
}

fn envelope_to_sse_event(envelope: &EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.id.to_string())
        .event(envelope.event.kind())
        .data(data))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("request_ids" = Option<String>, Query, description = "Comma-separated request IDs to filter events"),
    ),
    responses(
        (status = 200, description = "SSE stream of every request's progress envelopes"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request_ids = parse_request_ids(query.request_ids.as_deref());
    let rx = state.event_bus.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let request_ids = request_ids.clone();

        async move {
            match result {
                Ok(envelope) => {
                    if let Some(ref ids) = request_ids {
                        if !ids.contains(&envelope.request_id) {
                            return None;
                        }
                    }
                    Some(envelope_to_sse_event(&envelope))
                }
                Err(e) => {
                    tracing::warn!("SSE broadcast error: {:?}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!("{}, {},not-a-uuid", a, b);

        assert_eq!(parse_request_ids(Some(&raw)), Some(vec![a, b]));
        assert_eq!(parse_request_ids(None), None);
    }
}
