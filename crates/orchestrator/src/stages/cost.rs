//! Price resolution from source signals, with a lookup for unpriced venues.

use async_trait::async_trait;
use futures::future::join_all;
use pathfinder_core::{Candidate, CostProfile, PriceConfidence, StageId};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::adapters::{invoke, PriceAnswer, PriceQuery};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::scoring::{cost_profile, resolve_price};
use crate::state::{CandidateId, StageUpdate, StateKey};

pub struct CostStage {
    timeout: Duration,
}

impl CostStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn from_signals(candidate: &Candidate) -> CostProfile {
    let (tier, confidence) = resolve_price(&candidate.price_signals);
    cost_profile(tier, confidence)
}

#[async_trait]
impl Stage for CostStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Cost, Granularity::PerCandidate, self.timeout)
            .reads(&[StateKey::Candidates])
            .writes(&[StateKey::Cost])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let lookup = input.capabilities.price_lookup.as_ref();
        let call_timeout = input.call_timeout();

        let mut profiles: BTreeMap<CandidateId, CostProfile> = BTreeMap::new();
        let mut unpriced = Vec::new();
        for candidate in input.target_candidates() {
            let profile = from_signals(candidate);
            if profile.price_tier.is_some() {
                profiles.insert(candidate.id.clone(), profile);
            } else {
                unpriced.push(candidate);
            }
        }

        let lookups = join_all(unpriced.into_iter().map(|candidate| async move {
            let query = PriceQuery {
                candidate_id: candidate.id.clone(),
                name: candidate.name.clone(),
                address: candidate.address.clone(),
            };
            (candidate.id.clone(), invoke(lookup, &query, call_timeout).await)
        }))
        .await;

        let mut any_fallback = false;
        for (id, answer) in lookups {
            let profile = match answer {
                Ok(PriceAnswer { price_tier: Some(tier) }) => {
                    cost_profile(Some(tier), PriceConfidence::Medium)
                }
                Ok(PriceAnswer { price_tier: None }) => cost_profile(None, PriceConfidence::None),
                Err(_) => {
                    any_fallback = true;
                    cost_profile(None, PriceConfidence::None)
                }
            };
            profiles.insert(id, profile);
        }

        Ok(StageOutput::with_outcome(StageUpdate::Cost(profiles), any_fallback))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        StageUpdate::Cost(
            input
                .target_candidates()
                .map(|c| (c.id.clone(), from_signals(c)))
                .collect(),
        )
    }
}
