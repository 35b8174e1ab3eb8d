//! Risk assessment of the current top candidates.

use async_trait::async_trait;
use futures::future::join_all;
use pathfinder_core::{RiskAssessment, StageId};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::adapters::{invoke, RiskQuery};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::state::{StageUpdate, StateKey};

pub struct RiskStage {
    timeout: Duration,
}

impl RiskStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for RiskStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Risk, Granularity::PerCandidate, self.timeout)
            .reads(&[StateKey::Intent, StateKey::Candidates])
            .writes(&[StateKey::Risk])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let state = input.state;
        let signals = input.capabilities.risk_signals.as_ref();
        let history = input.capabilities.risk_history.as_ref();
        let call_timeout = input.call_timeout();

        let results = join_all(input.target_candidates().map(|candidate| async move {
            let query = RiskQuery::for_candidate(candidate, &state.intent);
            let (current, past) = tokio::join!(
                invoke(signals, &query, call_timeout),
                invoke(history, &query, call_timeout)
            );
            (candidate.id.clone(), current, past)
        }))
        .await;

        let mut any_fallback = false;
        let mut assessments = BTreeMap::new();
        for (id, current, past) in results {
            let assessment = match (current, past) {
                (Ok(mut flags), Ok(more)) => {
                    flags.extend(more);
                    RiskAssessment::checked(flags)
                }
                (Ok(flags), Err(_)) | (Err(_), Ok(flags)) => {
                    any_fallback = true;
                    RiskAssessment::checked(flags)
                }
                (Err(_), Err(_)) => {
                    any_fallback = true;
                    RiskAssessment::unchecked()
                }
            };
            assessments.insert(id, assessment);
        }

        Ok(StageOutput::with_outcome(StageUpdate::Risk(assessments), any_fallback))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        StageUpdate::Risk(
            input
                .target_candidates()
                .map(|c| (c.id.clone(), RiskAssessment::unchecked()))
                .collect(),
        )
    }
}
