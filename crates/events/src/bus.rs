//! Process-wide mirror of every request's progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::EventEnvelope;

const DEFAULT_CAPACITY: usize = 1000;

/// Broadcasts envelopes from every in-flight request to observers.
///
/// Publishing never blocks a request: with no observers the envelope is
/// dropped, and slow observers lag rather than apply backpressure.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many observers received the envelope.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Every envelope published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Envelopes of one request, ending after its terminal envelope.
    pub fn subscribe_request(&self, request_id: Uuid) -> RequestReceiver {
        RequestReceiver {
            request_id,
            rx: self.sender.subscribe(),
            finished: false,
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus subscription narrowed to a single request.
pub struct RequestReceiver {
    request_id: Uuid,
    rx: broadcast::Receiver<EventEnvelope>,
    finished: bool,
    missed: u64,
}

impl RequestReceiver {
    /// Next envelope of the request; `None` once the terminal envelope was
    /// delivered or the bus is gone.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if self.finished {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.request_id == self.request_id => {
                    self.finished = envelope.is_terminal();
                    return Some(envelope);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => self.missed += n,
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Envelopes of any request skipped because this receiver lagged.
    pub fn missed(&self) -> u64 {
        self.missed
    }
}
