//! Event types emitted while a planning request runs

use chrono::{DateTime, Utc};
use pathfinder_core::{PlanResponse, StageId, StageOutcome};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping every event with ordering metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Request this event belongs to
    pub request_id: Uuid,
    /// Strictly increasing within one request, starting at 1
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(request_id: Uuid, sequence: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }
}

/// All events a planning request can produce
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A stage finished, either with its capability result or its fallback
    #[serde(rename = "stage.completed")]
    StageCompleted {
        stage: StageId,
        label: String,
        outcome: StageOutcome,
        latency_ms: u64,
        /// Evaluation attempt the stage ran in, starting at 1
        attempt: u32,
    },

    /// The risk stage vetoed the current ranking
    #[serde(rename = "veto.raised")]
    VetoRaised {
        attempt: u32,
        reason: String,
        /// False when the retry budget or deadline is spent
        will_retry: bool,
    },

    /// Terminal event carrying the full response
    #[serde(rename = "result")]
    Result { response: Box<PlanResponse> },
}

impl Event {
    pub fn stage_completed(stage: StageId, outcome: StageOutcome, latency_ms: u64, attempt: u32) -> Self {
        Event::StageCompleted {
            stage,
            label: stage.label().to_string(),
            outcome,
            latency_ms,
            attempt,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StageCompleted { .. } => "stage.completed",
            Event::VetoRaised { .. } => "veto.raised",
            Event::Result { .. } => "result",
        }
    }

    /// The stage this event reports on, if any
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Event::StageCompleted { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Result { .. })
    }
}
