use pathfinder_core::PlanRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use events::EventEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start planning; progress and the result stream back on this socket.
    Plan { request: PlanRequest },
    /// Observe progress of other requests.
    Subscribe { filter: Option<SubscriptionFilter> },
    Unsubscribe,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Stage completion or veto for this socket's request
    Progress { envelope: EventEnvelope },
    /// Terminal envelope for this socket's request
    Result { envelope: EventEnvelope },
    /// The plan request was malformed and nothing was run
    Rejected { field: Option<String>, message: String },
    /// Envelope from a subscribed request
    Event { envelope: EventEnvelope },
    Subscribed { filter: Option<SubscriptionFilter> },
    Unsubscribed,
    Pong,
    Error { message: String },
}

impl ServerMessage {
    /// Wrap an envelope of this socket's own request.
    pub fn for_own_request(envelope: EventEnvelope) -> Self {
        if envelope.is_terminal() {
            Self::Result { envelope }
        } else {
            Self::Progress { envelope }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SubscriptionFilter {
    pub request_ids: Option<Vec<Uuid>>,
}

impl SubscriptionFilter {
    pub fn for_request(request_id: Uuid) -> Self {
        Self {
            request_ids: Some(vec![request_id]),
        }
    }

    pub fn for_requests(request_ids: Vec<Uuid>) -> Self {
        Self {
            request_ids: Some(request_ids),
        }
    }

    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        match &self.request_ids {
            Some(ids) => ids.contains(&envelope.request_id),
            None => true,
        }
    }
}
