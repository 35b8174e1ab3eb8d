//! Request pipeline.
//!
//! ```text
//! intent -> discovery -> [fit | cost | access] -> rank -> risk
//!              ^                                           |
//!              +---------------- veto, retry --------------+
//!                                                          |
//!                                   accepted / exhausted -> synthesis -> action
//! ```
//!
//! The service owns nothing request-scoped: every call builds its own
//! [`ExecutionState`] and drops it when the response is returned or the
//! future is dropped.

use events::{EventBus, EventEnvelope};
use pathfinder_core::{ExecutionSummary, PlanRequest, PlanResponse, RankedVenue, StageId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::Capabilities;
use crate::config::PipelineConfig;
use crate::core::{execute, FanOut, ProgressEmitter, Stage};
use crate::error::Result;
use crate::scoring::{cost_profile, rank, resolve_price, shortlist, Weights};
use crate::stages::{template_rationale, StageSuite};
use crate::state::{CandidateId, ExecutionState};
use crate::veto::{veto_reason, VetoState};

const UNCHECKED_WARNING: &str = "[unchecked] risk was not evaluated for this venue";

#[derive(Clone)]
pub struct PlanService {
    capabilities: Capabilities,
    config: PipelineConfig,
    bus: Option<EventBus>,
}

impl PlanService {
    pub fn new(capabilities: Capabilities, config: PipelineConfig) -> Self {
        Self {
            capabilities,
            config,
            bus: None,
        }
    }

    /// Mirror every request's progress onto a shared bus.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Plan a request and return the final response.
    pub async fn plan(&self, request: PlanRequest) -> Result<PlanResponse> {
        request.validate()?;
        let state = self.new_state(request);
        let progress = self.emitter(state.request_id);
        self.run(state, progress).await
    }

    /// Plan a request, pushing progress envelopes to `sink` as stages finish.
    /// The last envelope is the terminal `result`.
    pub async fn plan_streaming(
        &self,
        request: PlanRequest,
        sink: mpsc::UnboundedSender<EventEnvelope>,
    ) -> Result<PlanResponse> {
        request.validate()?;
        let state = self.new_state(request);
        let progress = self.emitter(state.request_id).with_sink(sink);
        self.run(state, progress).await
    }

    fn new_state(&self, request: PlanRequest) -> ExecutionState {
        ExecutionState::new(request, self.config.max_retries, self.config.deadline())
    }

    fn emitter(&self, request_id: Uuid) -> ProgressEmitter {
        let emitter = ProgressEmitter::new(request_id);
        match self.bus {
            Some(ref bus) => emitter.with_bus(bus.clone()),
            None => emitter,
        }
    }

    async fn run(&self, mut state: ExecutionState, progress: ProgressEmitter) -> Result<PlanResponse> {
        let stages = StageSuite::new(&self.config);
        let caps = &self.capabilities;
        info!(
            request_id = %state.request_id,
            prompt_len = state.request.prompt.len(),
            group_size = state.request.group_size,
            "Planning request"
        );

        let report = execute(&stages.intent, &state, caps, &[]).await?;
        progress.stage_completed(&report, state.veto.attempts());
        state.apply(report.update)?;

        let weights = Weights::resolve(&state.weights, state.active_stages());
        let members: Vec<&dyn Stage> = stages
            .enrichment()
            .into_iter()
            .filter(|s| state.is_active(s.contract().stage))
            .collect();
        let enrichment = FanOut::new(members)?;
        info!(
            request_id = %state.request_id,
            complexity = state.complexity.as_str(),
            stages = ?state.active_stages().to_vec(),
            "Active stages fixed"
        );

        loop {
            let attempt = state.veto.attempts();

            let report = execute(&stages.discovery, &state, caps, &[]).await?;
            progress.stage_completed(&report, attempt);
            let new_ids = state.apply(report.update)?;
            debug!(
                request_id = %state.request_id,
                attempt,
                new_candidates = new_ids.len(),
                "Discovery merged into state"
            );

            if !enrichment.is_empty() && !new_ids.is_empty() {
                enrichment.run(&mut state, caps, &new_ids, &progress).await?;
            }

            if !state.is_active(StageId::Risk) {
                state.veto.accept()?;
                break;
            }

            let top = self
                .assess_risk(&mut state, &stages, &weights, &progress, attempt)
                .await?;
            let viable = state.viable().count();
            let top_assessment = top.as_ref().and_then(|id| state.risk.get(id));
            let Some(reason) = veto_reason(top_assessment, viable, self.config.floor) else {
                state.veto.accept()?;
                break;
            };

            state.veto.veto(reason.clone())?;
            let has_time = state.remaining() >= self.config.min_retry_budget();
            let will_retry = state.veto.resolve_veto(has_time)? == VetoState::Retrying;
            warn!(
                request_id = %state.request_id,
                attempt,
                will_retry,
                reason = %reason,
                "Ranking vetoed"
            );
            progress.veto_raised(attempt, &reason, will_retry);
            if !will_retry {
                break;
            }
            state.veto.begin_attempt()?;
        }

        let (venues, reinstated) = self.ranked_venues(&state, &weights);
        if !reinstated.is_empty() {
            info!(
                request_id = %state.request_id,
                reinstated = ?reinstated,
                "Excluded venues reinstated to meet the floor"
            );
        }
        state.ranked = venues;

        let report = execute(&stages.synthesis, &state, caps, &[]).await?;
        progress.stage_completed(&report, state.veto.attempts());
        state.apply(report.update)?;
        attach_rationales(&mut state);

        if state.is_active(StageId::Action) {
            let report = execute(&stages.action, &state, caps, &[]).await?;
            progress.stage_completed(&report, state.veto.attempts());
            state.apply(report.update)?;
        }

        let response = PlanResponse {
            venues: std::mem::take(&mut state.ranked),
            summary: std::mem::take(&mut state.summary),
            pending_action: state.pending_action.take(),
            execution: ExecutionSummary {
                request_id: state.request_id,
                complexity: state.complexity,
                active_stages: state.active_stages().to_vec(),
                attempts: state.veto.attempts(),
                exhausted: state.veto.is_exhausted(),
                veto_reason: state.veto.reason().map(str::to_string),
            },
        };
        info!(
            request_id = %state.request_id,
            venues = response.venues.len(),
            attempts = response.execution.attempts,
            exhausted = response.execution.exhausted,
            "Request planned"
        );
        progress.result(&response);
        Ok(response)
    }

    /// Run risk windows over the current ranking until its head is fully
    /// assessed, excluding dealbreakers as they are found. Returns the
    /// post-risk top of the ranking, counting this attempt's dealbreakers.
    async fn assess_risk(
        &self,
        state: &mut ExecutionState,
        stages: &StageSuite,
        weights: &Weights,
        progress: &ProgressEmitter,
        attempt: u32,
    ) -> Result<Option<CandidateId>> {
        let window = self.config.risk_window.max(self.config.shortlist_len());
        let mut flagged: Vec<CandidateId> = Vec::new();

        loop {
            let targets: Vec<CandidateId> = rank(state, weights, |c| !state.is_excluded(&c.id))
                .into_iter()
                .take(window)
                .map(|s| s.candidate.id.clone())
                .filter(|id| !state.risk.contains_key(id))
                .collect();
            if targets.is_empty() {
                break;
            }

            let assessed = state.risk.len();
            let report = execute(&stages.risk, state, &self.capabilities, &targets).await?;
            progress.stage_completed(&report, attempt);
            state.apply(report.update)?;
            if state.risk.len() == assessed {
                break;
            }
            for id in targets {
                if state.risk.get(&id).map_or(false, |r| r.is_dealbreaker()) {
                    state.exclude(&id);
                    flagged.push(id);
                }
            }
        }

        let top = rank(state, weights, |c| {
            !state.is_excluded(&c.id) || flagged.contains(&c.id)
        })
        .first()
        .map(|s| s.candidate.id.clone());
        Ok(top)
    }

    /// Shortlist the current state into response entries, without rationales.
    fn ranked_venues(&self, state: &ExecutionState, weights: &Weights) -> (Vec<RankedVenue>, Vec<String>) {
        let risk_active = state.is_active(StageId::Risk);
        let (picked, reinstated) = shortlist(state, weights, self.config.shortlist_len(), self.config.floor);

        let venues = picked
            .into_iter()
            .enumerate()
            .map(|(i, scored)| {
                let candidate = scored.candidate;
                let cost = state.cost.get(&candidate.id).copied().unwrap_or_else(|| {
                    let (tier, confidence) = resolve_price(&candidate.price_signals);
                    cost_profile(tier, confidence)
                });
                let risk_warning = match state.risk.get(&candidate.id) {
                    Some(assessment) if assessment.evaluated => assessment.warning(),
                    _ if risk_active => UNCHECKED_WARNING.to_string(),
                    _ => String::new(),
                };
                RankedVenue {
                    rank: i as u32 + 1,
                    id: candidate.id.clone(),
                    name: candidate.name.clone(),
                    address: candidate.address.clone(),
                    coordinates: candidate.coordinates,
                    rating: candidate.rating,
                    price_tier: cost.price_tier,
                    price_confidence: cost.confidence,
                    fit_score: state.fit.get(&candidate.id).and_then(|f| f.score),
                    composite_score: scored.composite,
                    breakdown: scored.breakdown,
                    rationale: String::new(),
                    risk_warning,
                }
            })
            .collect();
        (venues, reinstated)
    }
}

/// Copy synthesized rationales onto the ranked entries. Risk warnings are
/// always visible in the rationale text.
fn attach_rationales(state: &mut ExecutionState) {
    let mut ranked = std::mem::take(&mut state.ranked);
    for venue in ranked.iter_mut() {
        let mut rationale = state
            .rationales
            .get(&venue.id)
            .cloned()
            .unwrap_or_else(|| template_rationale(venue));
        if !venue.risk_warning.is_empty() && !rationale.contains(&venue.risk_warning) {
            rationale = format!("{} Warning: {}", rationale, venue.risk_warning);
        }
        venue.rationale = rationale;
    }
    state.ranked = ranked;
}
