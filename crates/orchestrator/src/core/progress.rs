//! Ordered progress emitter for one request.
//!
//! Every envelope gets the next sequence number of its request. Envelopes go
//! to the caller's channel and, optionally, to the process-wide bus. After the
//! terminal `result` event nothing else is emitted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use events::{Event, EventBus, EventEnvelope};
use pathfinder_core::PlanResponse;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::executor::StageReport;

#[derive(Clone)]
pub struct ProgressEmitter {
    request_id: Uuid,
    sequence: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    sink: Option<mpsc::UnboundedSender<EventEnvelope>>,
    bus: Option<EventBus>,
}

impl ProgressEmitter {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            sequence: Arc::new(AtomicU64::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
            sink: None,
            bus: None,
        }
    }

    /// Deliver envelopes to a streaming caller.
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Mirror envelopes onto the shared bus for observers.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Emit an event with the next sequence number. Returns the sequence
    /// number, or `None` once the terminal event has gone out.
    pub fn emit(&self, event: Event) -> Option<u64> {
        if event.is_terminal() {
            if self.finished.swap(true, Ordering::SeqCst) {
                debug!(request_id = %self.request_id, "Duplicate terminal event dropped");
                return None;
            }
        } else if self.finished.load(Ordering::SeqCst) {
            debug!(
                request_id = %self.request_id,
                kind = event.kind(),
                "Event after terminal result dropped"
            );
            return None;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope::new(self.request_id, sequence, event);

        if let Some(ref sink) = self.sink {
            if sink.send(envelope.clone()).is_err() {
                debug!(request_id = %self.request_id, sequence, "Progress receiver gone");
            }
        }
        if let Some(ref bus) = self.bus {
            bus.publish(envelope);
        }
        Some(sequence)
    }

    pub fn stage_completed(&self, report: &StageReport, attempt: u32) -> Option<u64> {
        self.emit(Event::stage_completed(
            report.stage,
            report.outcome,
            report.latency_ms(),
            attempt,
        ))
    }

    pub fn veto_raised(&self, attempt: u32, reason: &str, will_retry: bool) -> Option<u64> {
        self.emit(Event::VetoRaised {
            attempt,
            reason: reason.to_string(),
            will_retry,
        })
    }

    pub fn result(&self, response: &PlanResponse) -> Option<u64> {
        self.emit(Event::Result {
            response: Box::new(response.clone()),
        })
    }

    /// Last sequence number handed out.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfinder_core::{ComplexityTier, ExecutionSummary, StageId, StageOutcome};

    fn response(request_id: Uuid) -> PlanResponse {
        PlanResponse {
            venues: vec![],
            summary: String::new(),
            pending_action: None,
            execution: ExecutionSummary {
                request_id,
                complexity: ComplexityTier::MultiFactor,
                active_stages: vec![],
                attempts: 1,
                exhausted: false,
                veto_reason: None,
            },
        }
    }

    fn stage_event(stage: StageId) -> Event {
        Event::stage_completed(stage, StageOutcome::Completed, 1, 1)
    }

    #[test]
    fn test_sequence_increments() {
        let emitter = ProgressEmitter::new(Uuid::new_v4());
        assert_eq!(emitter.current_sequence(), 0);
        assert_eq!(emitter.emit(stage_event(StageId::Intent)), Some(1));
        assert_eq!(emitter.emit(stage_event(StageId::Discovery)), Some(2));
        assert_eq!(emitter.current_sequence(), 2);
    }

    #[test]
    fn test_clone_shares_sequence() {
        let emitter1 = ProgressEmitter::new(Uuid::new_v4());
        let emitter2 = emitter1.clone();

        emitter1.emit(stage_event(StageId::Fit));
        emitter2.emit(stage_event(StageId::Cost));
        assert_eq!(emitter1.current_sequence(), 2);
        assert_eq!(emitter2.current_sequence(), 2);
    }

    #[tokio::test]
    async fn test_terminal_event_is_last_and_once() {
        let request_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter::new(request_id).with_sink(tx);

        emitter.emit(stage_event(StageId::Intent));
        assert_eq!(emitter.result(&response(request_id)), Some(2));
        assert_eq!(emitter.result(&response(request_id)), None);
        assert_eq!(emitter.emit(stage_event(StageId::Synthesis)), None);
        assert!(emitter.is_finished());
        drop(emitter);

        let mut received = Vec::new();
        while let Some(envelope) = rx.recv().await {
            received.push(envelope);
        }
        assert_eq!(received.len(), 2);
        assert!(received[1].is_terminal());
        assert!(received.iter().all(|e| e.request_id == request_id));
    }

    #[test]
    fn test_dropped_receiver_is_swallowed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let emitter = ProgressEmitter::new(Uuid::new_v4()).with_sink(tx);
        assert_eq!(emitter.emit(stage_event(StageId::Intent)), Some(1));
    }

    #[tokio::test]
    async fn test_mirrors_to_bus() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let emitter = ProgressEmitter::new(Uuid::new_v4()).with_bus(bus);

        emitter.emit(stage_event(StageId::Risk));
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.sequence, 1);
        assert_eq!(envelope.event.stage(), Some(StageId::Risk));
    }
}
