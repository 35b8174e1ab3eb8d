//! Stage contract and the executor that runs one stage against state.
//!
//! A stage never fails: when its capability call errors, times out, or
//! produces an update outside its declared write set, the executor replaces
//! the result with the stage's deterministic fallback.

use async_trait::async_trait;
use pathfinder_core::{Candidate, StageId, StageOutcome};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::adapters::Capabilities;
use crate::error::{AdapterError, OrchestratorError, Result};
use crate::state::{CandidateId, ExecutionState, StageUpdate, StateKey};

/// Upper bound on the slack kept between a per-candidate call's timeout and
/// the stage's own timeout.
const CALL_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Runs once per request attempt
    PerRun,
    /// Runs once for each target candidate
    PerCandidate,
}

/// What a stage reads, what it writes, and how long it may take.
#[derive(Debug, Clone)]
pub struct StageContract {
    pub stage: StageId,
    pub reads: Vec<StateKey>,
    pub writes: Vec<StateKey>,
    pub granularity: Granularity,
    pub timeout: Duration,
}

impl StageContract {
    pub fn new(stage: StageId, granularity: Granularity, timeout: Duration) -> Self {
        Self {
            stage,
            reads: Vec::new(),
            writes: Vec::new(),
            granularity,
            timeout,
        }
    }

    pub fn reads(mut self, keys: &[StateKey]) -> Self {
        self.reads = keys.to_vec();
        self
    }

    pub fn writes(mut self, keys: &[StateKey]) -> Self {
        self.writes = keys.to_vec();
        self
    }

    pub fn may_write(&self, key: StateKey) -> bool {
        self.writes.contains(&key)
    }
}

/// Read-only view handed to a stage.
pub struct StageInput<'a> {
    pub state: &'a ExecutionState,
    pub capabilities: &'a Capabilities,
    /// Candidates to evaluate; empty for per-run stages
    pub targets: &'a [CandidateId],
    /// Stage budget, already clamped to the request deadline
    pub timeout: Duration,
}

impl<'a> StageInput<'a> {
    /// Budget for each individual capability call of a per-candidate stage.
    pub fn call_timeout(&self) -> Duration {
        self.timeout
            .saturating_sub((self.timeout / 10).min(CALL_GRACE))
    }

    /// Target candidates that exist in state, in target order.
    pub fn target_candidates(&self) -> impl Iterator<Item = &'a Candidate> + 'a {
        let (state, targets) = (self.state, self.targets);
        targets.iter().filter_map(move |id| state.candidate(id))
    }
}

pub struct StageOutput {
    pub update: StageUpdate,
    pub outcome: StageOutcome,
}

impl StageOutput {
    pub fn completed(update: StageUpdate) -> Self {
        Self {
            update,
            outcome: StageOutcome::Completed,
        }
    }

    /// Some part of the result came from a fallback.
    pub fn degraded(update: StageUpdate) -> Self {
        Self {
            update,
            outcome: StageOutcome::Fallback,
        }
    }

    pub fn with_outcome(update: StageUpdate, any_fallback: bool) -> Self {
        if any_fallback {
            Self::degraded(update)
        } else {
            Self::completed(update)
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn contract(&self) -> StageContract;

    /// Produce an update using the stage's capabilities.
    async fn run(&self, input: &StageInput<'_>) -> std::result::Result<StageOutput, AdapterError>;

    /// Deterministic substitute for a failed run. Must not fail.
    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate;
}

/// Result of one stage execution, before it is merged.
#[derive(Debug)]
pub struct StageReport {
    pub stage: StageId,
    pub outcome: StageOutcome,
    pub latency: Duration,
    pub update: StageUpdate,
}

impl StageReport {
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// Run one stage. Errors only when the stage is not active for the request.
pub async fn execute(
    stage: &dyn Stage,
    state: &ExecutionState,
    capabilities: &Capabilities,
    targets: &[CandidateId],
) -> Result<StageReport> {
    let contract = stage.contract();
    if !state.is_active(contract.stage) {
        return Err(OrchestratorError::StageInactive(contract.stage));
    }

    let timeout = contract.timeout.min(state.remaining());
    let input = StageInput {
        state,
        capabilities,
        targets,
        timeout,
    };

    let started = Instant::now();
    let (update, outcome) = match tokio::time::timeout(timeout, stage.run(&input)).await {
        Ok(Ok(output)) if contract.may_write(output.update.key()) => (output.update, output.outcome),
        Ok(Ok(output)) => {
            error!(
                request_id = %state.request_id,
                stage = %contract.stage,
                key = %output.update.key(),
                "Stage wrote outside its declared write set"
            );
            (stage.fallback(&input), StageOutcome::Fallback)
        }
        Ok(Err(e)) => {
            warn!(
                request_id = %state.request_id,
                stage = %contract.stage,
                error = %e,
                "Stage failed, using fallback"
            );
            (stage.fallback(&input), StageOutcome::Fallback)
        }
        Err(_) => {
            warn!(
                request_id = %state.request_id,
                stage = %contract.stage,
                timeout_ms = timeout.as_millis() as u64,
                "Stage timed out, using fallback"
            );
            (stage.fallback(&input), StageOutcome::Fallback)
        }
    };
    let latency = started.elapsed();

    info!(
        request_id = %state.request_id,
        stage = %contract.stage,
        outcome = outcome.as_str(),
        latency_ms = latency.as_millis() as u64,
        targets = targets.len(),
        "Stage completed"
    );

    Ok(StageReport {
        stage: contract.stage,
        outcome,
        latency,
        update,
    })
}
