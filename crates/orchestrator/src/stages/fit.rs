//! Subjective fit scoring, one capability call per candidate.

use async_trait::async_trait;
use futures::future::join_all;
use pathfinder_core::{FitScore, StageId};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::adapters::{invoke, FitQuery};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::state::{StageUpdate, StateKey};

pub struct FitStage {
    timeout: Duration,
}

impl FitStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for FitStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Fit, Granularity::PerCandidate, self.timeout)
            .reads(&[StateKey::Intent, StateKey::Candidates])
            .writes(&[StateKey::Fit])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let state = input.state;
        let scorer = input.capabilities.fit_scorer.as_ref();
        let call_timeout = input.call_timeout();
        let preferred: Vec<String> = state
            .profile
            .as_ref()
            .map(|p| p.preferred_vibes.clone())
            .unwrap_or_default();
        let preferred = &preferred;

        let results = join_all(input.target_candidates().map(|candidate| async move {
            let query = FitQuery::for_candidate(candidate, &state.intent, preferred);
            (candidate.id.clone(), invoke(scorer, &query, call_timeout).await)
        }))
        .await;

        let mut any_fallback = false;
        let scores: BTreeMap<_, _> = results
            .into_iter()
            .map(|(id, result)| match result {
                Ok(fit) => {
                    let fit = match fit.score {
                        Some(score) => FitScore::new(score, fit.confidence),
                        None => FitScore::unscored(),
                    };
                    (id, fit)
                }
                Err(_) => {
                    any_fallback = true;
                    (id, FitScore::unscored())
                }
            })
            .collect();

        Ok(StageOutput::with_outcome(StageUpdate::Fit(scores), any_fallback))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        StageUpdate::Fit(
            input
                .target_candidates()
                .map(|c| (c.id.clone(), FitScore::unscored()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::Scripted;
    use crate::adapters::Capabilities;
    use crate::core::execute;
    use crate::state::{ExecutionState, IntentUpdate};
    use pathfinder_core::{
        Candidate, ComplexityTier, Coordinates, ParsedIntent, PlanRequest, StageOutcome, StageSet,
    };
    use std::sync::Arc;

    fn state() -> ExecutionState {
        let mut state = ExecutionState::new(PlanRequest::new("karaoke"), 2, Duration::from_secs(30));
        state
            .apply(StageUpdate::Intent(Box::new(IntentUpdate {
                intent: ParsedIntent {
                    vibe: Some("lively".into()),
                    ..Default::default()
                },
                complexity: ComplexityTier::MultiFactor,
                active: StageSet::from_optional([StageId::Fit]),
                weights: BTreeMap::new(),
                profile: None,
            })))
            .unwrap();
        state
            .apply(StageUpdate::Candidates(vec![
                Candidate::new("a", "Echo Box", Coordinates::new(43.6, -79.4)),
                Candidate::new("b", "Quiet Room", Coordinates::new(43.6, -79.4)),
            ]))
            .unwrap();
        state
    }

    fn targets() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[tokio::test]
    async fn test_scores_each_target() {
        let scorer = Scripted::new("llm", |q: &FitQuery, _| {
            assert_eq!(q.vibe.as_deref(), Some("lively"));
            Ok(FitScore::new(if q.candidate_id == "a" { 0.9 } else { 0.2 }, 0.8))
        });
        let calls = scorer.calls();
        let caps = Capabilities::unconfigured().with_fit_scorer(Arc::new(scorer));

        let report = execute(&FitStage::new(Duration::from_secs(5)), &state(), &caps, &targets())
            .await
            .unwrap();
        assert_eq!(report.outcome, StageOutcome::Completed);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        let StageUpdate::Fit(scores) = report.update else {
            panic!("expected fit scores");
        };
        assert_eq!(scores["a"].score, Some(0.9));
        assert_eq!(scores["b"].score, Some(0.2));
    }

    #[tokio::test]
    async fn test_single_failure_marks_only_that_candidate() {
        let scorer = Scripted::new("llm", |q: &FitQuery, _| {
            if q.candidate_id == "b" {
                Err(AdapterError::invalid("llm", "not json"))
            } else {
                Ok(FitScore { score: Some(3.0), confidence: 1.0 })
            }
        });
        let caps = Capabilities::unconfigured().with_fit_scorer(Arc::new(scorer));

        let report = execute(&FitStage::new(Duration::from_secs(5)), &state(), &caps, &targets())
            .await
            .unwrap();
        assert_eq!(report.outcome, StageOutcome::Fallback);
        let StageUpdate::Fit(scores) = report.update else {
            panic!("expected fit scores");
        };
        assert_eq!(scores["a"].score, Some(1.0));
        assert_eq!(scores["b"], FitScore::unscored());
    }
}
