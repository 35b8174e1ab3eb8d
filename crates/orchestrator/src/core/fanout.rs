//! Concurrent execution of mutually independent stages.
//!
//! Members read one snapshot of the state and run side by side; each resolves
//! through its own timeout and fallback, so a slow member never holds up the
//! others. Progress is reported in completion order; updates are merged only
//! after every member has finished.

use futures::stream::{FuturesUnordered, StreamExt};
use pathfinder_core::{StageId, StageOutcome};
use tracing::debug;

use super::executor::{execute, Stage, StageContract};
use super::progress::ProgressEmitter;
use crate::adapters::Capabilities;
use crate::error::{OrchestratorError, Result};
use crate::state::{CandidateId, ExecutionState};

pub struct FanOut<'s> {
    members: Vec<&'s dyn Stage>,
}

impl<'s> FanOut<'s> {
    /// Build a group, rejecting members that share a write key or read a key
    /// another member writes.
    pub fn new(members: Vec<&'s dyn Stage>) -> Result<Self> {
        let contracts: Vec<StageContract> = members.iter().map(|m| m.contract()).collect();

        for (i, a) in contracts.iter().enumerate() {
            for b in contracts.iter().skip(i + 1) {
                if let Some(key) = a.writes.iter().find(|k| b.writes.contains(k)) {
                    return Err(OrchestratorError::InvalidFanOut(format!(
                        "{} and {} both write {}",
                        a.stage, b.stage, key
                    )));
                }
            }
            for b in contracts.iter().filter(|b| b.stage != a.stage) {
                if let Some(key) = a.reads.iter().find(|k| b.writes.contains(k)) {
                    return Err(OrchestratorError::InvalidFanOut(format!(
                        "{} reads {} written by {}",
                        a.stage, key, b.stage
                    )));
                }
            }
        }

        Ok(Self { members })
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Run every member against `targets` and merge the results.
    pub async fn run(
        &self,
        state: &mut ExecutionState,
        capabilities: &Capabilities,
        targets: &[CandidateId],
        progress: &ProgressEmitter,
    ) -> Result<Vec<(StageId, StageOutcome)>> {
        let attempt = state.veto.attempts();

        let reports = {
            let snapshot: &ExecutionState = state;
            let mut pending: FuturesUnordered<_> = self
                .members
                .iter()
                .map(|member| execute(*member, snapshot, capabilities, targets))
                .collect();

            let mut reports = Vec::with_capacity(self.members.len());
            while let Some(report) = pending.next().await {
                let report = report?;
                progress.stage_completed(&report, attempt);
                reports.push(report);
            }
            reports
        };

        let mut outcomes = Vec::with_capacity(reports.len());
        for report in reports {
            debug!(
                request_id = %state.request_id,
                stage = %report.stage,
                "Merging fan-out result"
            );
            outcomes.push((report.stage, report.outcome));
            state.apply(report.update)?;
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::{Granularity, StageInput, StageOutput};
    use crate::error::AdapterError;
    use crate::state::{IntentUpdate, StageUpdate, StateKey};
    use async_trait::async_trait;
    use events::Event;
    use pathfinder_core::{
        AccessProfile, ComplexityTier, CostProfile, FitScore, ParsedIntent, PlanRequest,
        PriceConfidence, StageSet, TravelMode,
    };
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Enrichment stand-in that sleeps, then either succeeds or fails.
    struct Member {
        stage: StageId,
        key: StateKey,
        reads: Vec<StateKey>,
        delay: Duration,
        fail: bool,
    }

    impl Member {
        fn new(stage: StageId, key: StateKey, delay_ms: u64) -> Self {
            Self {
                stage,
                key,
                reads: vec![StateKey::Candidates],
                delay: Duration::from_millis(delay_ms),
                fail: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn update(&self, targets: &[CandidateId], live: bool) -> StageUpdate {
            let ids = targets.iter().cloned();
            match self.key {
                StateKey::Fit => StageUpdate::Fit(
                    ids.map(|id| {
                        let fit = if live { FitScore::new(0.8, 1.0) } else { FitScore::unscored() };
                        (id, fit)
                    })
                    .collect(),
                ),
                StateKey::Cost => StageUpdate::Cost(
                    ids.map(|id| {
                        (
                            id,
                            CostProfile {
                                price_tier: None,
                                confidence: PriceConfidence::None,
                                value_score: 0.3,
                            },
                        )
                    })
                    .collect(),
                ),
                _ => StageUpdate::Access(
                    ids.map(|id| (id, AccessProfile::unknown(TravelMode::Driving)))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl Stage for Member {
        fn contract(&self) -> StageContract {
            StageContract::new(self.stage, Granularity::PerCandidate, Duration::from_secs(1))
                .reads(&self.reads)
                .writes(&[self.key])
        }

        async fn run(&self, input: &StageInput<'_>) -> std::result::Result<StageOutput, AdapterError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AdapterError::unavailable(self.stage.as_str(), "down"));
            }
            Ok(StageOutput::completed(self.update(input.targets, true)))
        }

        fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
            self.update(input.targets, false)
        }
    }

    fn state() -> ExecutionState {
        let mut state = ExecutionState::new(PlanRequest::new("x"), 2, Duration::from_secs(30));
        state
            .apply(StageUpdate::Intent(Box::new(IntentUpdate {
                intent: ParsedIntent::default(),
                complexity: ComplexityTier::MultiFactor,
                active: StageSet::all(),
                weights: BTreeMap::new(),
                profile: None,
            })))
            .unwrap();
        state
    }

    #[test]
    fn test_overlapping_writes_rejected() {
        let a = Member::new(StageId::Fit, StateKey::Fit, 0);
        let b = Member::new(StageId::Cost, StateKey::Fit, 0);
        let err = FanOut::new(vec![&a as &dyn Stage, &b]).err().unwrap();
        assert!(err.to_string().contains("both write fit"));
    }

    #[test]
    fn test_dependent_read_rejected() {
        let a = Member::new(StageId::Fit, StateKey::Fit, 0);
        let mut b = Member::new(StageId::Cost, StateKey::Cost, 0);
        b.reads.push(StateKey::Fit);
        let err = FanOut::new(vec![&a as &dyn Stage, &b]).err().unwrap();
        assert!(matches!(err, OrchestratorError::InvalidFanOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_concurrently_and_reports_in_completion_order() {
        let mut state = state();
        let caps = Capabilities::unconfigured();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let progress = ProgressEmitter::new(state.request_id).with_sink(tx);

        let fit = Member::new(StageId::Fit, StateKey::Fit, 300);
        let cost = Member::new(StageId::Cost, StateKey::Cost, 100);
        let access = Member::new(StageId::Access, StateKey::Access, 200);
        let group = FanOut::new(vec![&fit as &dyn Stage, &cost, &access]).unwrap();

        let targets = vec!["a".to_string(), "b".to_string()];
        let started = Instant::now();
        let outcomes = group.run(&mut state, &caps, &targets, &progress).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert_eq!(outcomes.len(), 3);
        assert_eq!(state.fit.len(), 2);
        assert_eq!(state.cost.len(), 2);
        assert_eq!(state.access.len(), 2);

        drop(progress);
        let mut order = Vec::new();
        while let Some(envelope) = rx.recv().await {
            if let Event::StageCompleted { stage, .. } = envelope.event {
                order.push((envelope.sequence, stage));
            }
        }
        assert_eq!(
            order,
            vec![(1, StageId::Cost), (2, StageId::Access), (3, StageId::Fit)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_member_falls_back_without_blocking_others() {
        let mut state = state();
        let caps = Capabilities::unconfigured();
        let progress = ProgressEmitter::new(state.request_id);

        let fit = Member::new(StageId::Fit, StateKey::Fit, 60_000);
        let cost = Member::new(StageId::Cost, StateKey::Cost, 10);
        let access = Member::new(StageId::Access, StateKey::Access, 10).failing();
        let group = FanOut::new(vec![&fit as &dyn Stage, &cost, &access]).unwrap();

        let targets = vec!["a".to_string()];
        let started = Instant::now();
        let outcomes = group.run(&mut state, &caps, &targets, &progress).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(1));
        let outcome = |stage| outcomes.iter().find(|(s, _)| *s == stage).map(|(_, o)| *o);
        assert_eq!(outcome(StageId::Fit), Some(StageOutcome::Fallback));
        assert_eq!(outcome(StageId::Cost), Some(StageOutcome::Completed));
        assert_eq!(outcome(StageId::Access), Some(StageOutcome::Fallback));
        assert_eq!(state.fit["a"], FitScore::unscored());
        assert!(state.access.contains_key("a"));
    }
}
