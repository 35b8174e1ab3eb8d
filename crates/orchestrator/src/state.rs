//! Request-scoped execution state.
//!
//! One `ExecutionState` exists per request. Stages only read it; every change
//! arrives as a [`StageUpdate`] confined to one [`StateKey`] and is applied by
//! the pipeline.

use pathfinder_core::{
    AccessProfile, Candidate, ComplexityTier, CostProfile, Dimension, FitScore, ParsedIntent,
    PendingAction, PlanRequest, PreferenceProfile, RankedVenue, RiskAssessment, StageId, StageSet,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::veto::RetryController;

pub type CandidateId = String;

/// A region of state written by exactly one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    Intent,
    Candidates,
    Fit,
    Cost,
    Access,
    Risk,
    Synthesis,
    Action,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Candidates => "candidates",
            Self::Fit => "fit",
            Self::Cost => "cost",
            Self::Access => "access",
            Self::Risk => "risk",
            Self::Synthesis => "synthesis",
            Self::Action => "action",
        }
    }

    /// The stage that owns this key.
    pub fn owner(&self) -> StageId {
        match self {
            Self::Intent => StageId::Intent,
            Self::Candidates => StageId::Discovery,
            Self::Fit => StageId::Fit,
            Self::Cost => StageId::Cost,
            Self::Access => StageId::Access,
            Self::Risk => StageId::Risk,
            Self::Synthesis => StageId::Synthesis,
            Self::Action => StageId::Action,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentUpdate {
    pub intent: ParsedIntent,
    pub complexity: ComplexityTier,
    pub active: StageSet,
    pub weights: BTreeMap<Dimension, f64>,
    pub profile: Option<PreferenceProfile>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisUpdate {
    pub summary: String,
    pub rationales: BTreeMap<CandidateId, String>,
    pub draft: Option<String>,
}

/// A partial state change produced by one stage execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    Intent(Box<IntentUpdate>),
    /// Newly discovered candidates, in discovery order
    Candidates(Vec<Candidate>),
    Fit(BTreeMap<CandidateId, FitScore>),
    Cost(BTreeMap<CandidateId, CostProfile>),
    Access(BTreeMap<CandidateId, AccessProfile>),
    Risk(BTreeMap<CandidateId, RiskAssessment>),
    Synthesis(SynthesisUpdate),
    Action(Option<PendingAction>),
}

impl StageUpdate {
    pub fn key(&self) -> StateKey {
        match self {
            Self::Intent(_) => StateKey::Intent,
            Self::Candidates(_) => StateKey::Candidates,
            Self::Fit(_) => StateKey::Fit,
            Self::Cost(_) => StateKey::Cost,
            Self::Access(_) => StateKey::Access,
            Self::Risk(_) => StateKey::Risk,
            Self::Synthesis(_) => StateKey::Synthesis,
            Self::Action(_) => StateKey::Action,
        }
    }
}

#[derive(Debug)]
pub struct ExecutionState {
    pub request_id: Uuid,
    pub request: PlanRequest,
    pub intent: ParsedIntent,
    pub complexity: ComplexityTier,
    active: StageSet,
    active_fixed: bool,
    /// Raw importance weights; normalized at scoring time
    pub weights: BTreeMap<Dimension, f64>,
    pub profile: Option<PreferenceProfile>,
    /// Discovery order; ids unique
    pub candidates: Vec<Candidate>,
    pub fit: BTreeMap<CandidateId, FitScore>,
    pub cost: BTreeMap<CandidateId, CostProfile>,
    pub access: BTreeMap<CandidateId, AccessProfile>,
    pub risk: BTreeMap<CandidateId, RiskAssessment>,
    pub veto: RetryController,
    seen: BTreeSet<CandidateId>,
    excluded: BTreeSet<CandidateId>,
    pub ranked: Vec<RankedVenue>,
    pub summary: String,
    pub rationales: BTreeMap<CandidateId, String>,
    pub draft: Option<String>,
    pub pending_action: Option<PendingAction>,
    deadline: Instant,
}

impl ExecutionState {
    pub fn new(request: PlanRequest, max_retries: u32, budget: Duration) -> Self {
        let intent = ParsedIntent {
            group_size: request.group_size,
            ..ParsedIntent::default()
        };
        Self {
            request_id: Uuid::new_v4(),
            request,
            intent,
            complexity: ComplexityTier::default(),
            active: StageSet::mandatory(),
            active_fixed: false,
            weights: BTreeMap::new(),
            profile: None,
            candidates: Vec::new(),
            fit: BTreeMap::new(),
            cost: BTreeMap::new(),
            access: BTreeMap::new(),
            risk: BTreeMap::new(),
            veto: RetryController::new(max_retries),
            seen: BTreeSet::new(),
            excluded: BTreeSet::new(),
            ranked: Vec::new(),
            summary: String::new(),
            rationales: BTreeMap::new(),
            draft: None,
            pending_action: None,
            deadline: Instant::now() + budget,
        }
    }

    pub fn active_stages(&self) -> &StageSet {
        &self.active
    }

    pub fn is_active(&self, stage: StageId) -> bool {
        self.active.contains(stage)
    }

    /// Time left before the request deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn seen_ids(&self) -> impl Iterator<Item = &CandidateId> {
        self.seen.iter()
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(id)
    }

    pub fn exclude(&mut self, id: &str) {
        if self.excluded.insert(id.to_string()) {
            debug!(request_id = %self.request_id, candidate = %id, "Candidate excluded");
        }
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    /// Candidates not removed by risk filtering, in discovery order.
    pub fn viable(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .filter(move |c| !self.excluded.contains(&c.id))
    }

    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Merge one stage's update. Returns the ids of newly added candidates
    /// (empty for every key but `Candidates`).
    pub fn apply(&mut self, update: StageUpdate) -> Result<Vec<CandidateId>> {
        let owner = update.key().owner();
        if !self.is_active(owner) && owner != StageId::Intent {
            return Err(OrchestratorError::StageInactive(owner));
        }

        match update {
            StageUpdate::Intent(update) => {
                if self.active_fixed {
                    return Err(OrchestratorError::ActiveStagesFixed);
                }
                let IntentUpdate {
                    intent,
                    complexity,
                    active,
                    weights,
                    profile,
                } = *update;
                self.intent = intent;
                self.complexity = complexity;
                self.active = active;
                self.active_fixed = true;
                self.weights = weights;
                self.profile = profile;
            }
            StageUpdate::Candidates(found) => {
                let mut added = Vec::new();
                for candidate in found {
                    if self.seen.insert(candidate.id.clone()) {
                        added.push(candidate.id.clone());
                        self.candidates.push(candidate);
                    }
                }
                return Ok(added);
            }
            StageUpdate::Fit(values) => self.fit.extend(values),
            StageUpdate::Cost(values) => self.cost.extend(values),
            StageUpdate::Access(values) => self.access.extend(values),
            StageUpdate::Risk(values) => self.risk.extend(values),
            StageUpdate::Synthesis(update) => {
                self.summary = update.summary;
                self.rationales = update.rationales;
                self.draft = update.draft;
            }
            StageUpdate::Action(action) => self.pending_action = action,
        }
        Ok(Vec::new())
    }
}
