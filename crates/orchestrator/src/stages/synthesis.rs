//! Narrative summary and per-venue rationales for the shortlist.
//!
//! The narrator writes the prose when it can. Anything it leaves out, or the
//! whole result when it is unavailable, comes from fixed templates over the
//! score breakdown.

use async_trait::async_trait;
use pathfinder_core::{Dimension, RankedVenue, StageId};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::adapters::{invoke, NarrationRequest, NarrationVenue};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::state::{ExecutionState, StageUpdate, StateKey, SynthesisUpdate};

fn dimension_phrase(venue: &RankedVenue, dimension: Dimension, score: f64) -> String {
    match dimension {
        Dimension::Fit if score >= 0.7 => "strong match for the vibe".to_string(),
        Dimension::Fit if score >= 0.4 => "decent match for the vibe".to_string(),
        Dimension::Fit => "a looser match for the vibe".to_string(),
        Dimension::Value => match venue.price_tier {
            Some(tier) => format!(
                "{} pricing ({} confidence)",
                tier.symbol(),
                venue.price_confidence.as_str()
            ),
            None => "price unknown".to_string(),
        },
        Dimension::Access if score >= 0.7 => "easy to reach for the group".to_string(),
        Dimension::Access if score >= 0.4 => "a manageable trip for the group".to_string(),
        Dimension::Access => "a long trip for some of the group".to_string(),
        Dimension::Risk if score >= 0.95 => "no known risks".to_string(),
        Dimension::Risk => "some risks flagged".to_string(),
    }
}

/// One-sentence explanation built from a venue's score breakdown.
pub fn template_rationale(venue: &RankedVenue) -> String {
    let mut parts = Vec::new();
    if let Some(rating) = venue.rating {
        parts.push(format!("rated {:.1}", rating));
    }
    for part in venue.breakdown.iter().filter(|p| p.evaluated && p.weight > 0.0) {
        parts.push(dimension_phrase(venue, part.dimension, part.score));
    }
    if parts.is_empty() {
        parts.push("matches your search".to_string());
    }
    format!("{}: {}.", venue.name, parts.join(", "))
}

pub fn template_summary(state: &ExecutionState, venues: &[RankedVenue]) -> String {
    let Some(top) = venues.first() else {
        return "No venues matched this request.".to_string();
    };
    let activity = state.intent.activity.as_deref().unwrap_or("your plan");
    let mut summary = format!(
        "Top pick for {}: {} (score {:.2}).",
        activity, top.name, top.composite_score
    );
    let others: Vec<&str> = venues.iter().skip(1).map(|v| v.name.as_str()).collect();
    if !others.is_empty() {
        summary.push_str(&format!(" Also worth a look: {}.", others.join(" and ")));
    }
    if venues.iter().any(|v| !v.risk_warning.is_empty()) {
        summary.push_str(" Check the risk notes before booking.");
    }
    summary
}

pub fn template_draft(state: &ExecutionState, venues: &[RankedVenue]) -> Option<String> {
    let top = venues.first()?;
    let activity = state.intent.activity.as_deref().unwrap_or("our plan");
    let mut draft = format!("Hi all,\n\nFor {}, how about {}", activity, top.name);
    if !top.address.is_empty() {
        draft.push_str(&format!(" ({})", top.address));
    }
    draft.push_str("?\n");
    let backups: Vec<&str> = venues.iter().skip(1).map(|v| v.name.as_str()).collect();
    if !backups.is_empty() {
        draft.push_str(&format!("Backups: {}.\n", backups.join(", ")));
    }
    draft.push_str("\nLet me know if that works!");
    Some(draft)
}

fn wants_draft(state: &ExecutionState) -> bool {
    state.is_active(StageId::Action) && state.intent.requested_action.is_some()
}

fn template_update(state: &ExecutionState) -> SynthesisUpdate {
    let venues = &state.ranked;
    SynthesisUpdate {
        summary: template_summary(state, venues),
        rationales: venues
            .iter()
            .map(|v| (v.id.clone(), template_rationale(v)))
            .collect(),
        draft: if wants_draft(state) {
            template_draft(state, venues)
        } else {
            None
        },
    }
}

pub struct SynthesisStage {
    timeout: Duration,
}

impl SynthesisStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for SynthesisStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Synthesis, Granularity::PerRun, self.timeout)
            .reads(&[
                StateKey::Intent,
                StateKey::Candidates,
                StateKey::Fit,
                StateKey::Cost,
                StateKey::Access,
                StateKey::Risk,
            ])
            .writes(&[StateKey::Synthesis])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let state = input.state;
        let include_draft = wants_draft(state);
        let request = NarrationRequest {
            prompt: state.request.prompt.clone(),
            activity: state.intent.activity.clone(),
            venues: state
                .ranked
                .iter()
                .map(|v| NarrationVenue {
                    id: v.id.clone(),
                    name: v.name.clone(),
                    composite_score: v.composite_score,
                    price_tier: v.price_tier,
                    breakdown: v.breakdown.clone(),
                    risk_warning: v.risk_warning.clone(),
                })
                .collect(),
            include_draft,
        };

        let mut narration = invoke(
            input.capabilities.narrator.as_ref(),
            &request,
            input.call_timeout(),
        )
        .await?;

        let mut any_fallback = false;
        let summary = match narration.summary.trim() {
            "" => {
                any_fallback = true;
                template_summary(state, &state.ranked)
            }
            text => text.to_string(),
        };

        let mut rationales = BTreeMap::new();
        for venue in &state.ranked {
            let text = narration
                .rationales
                .remove(&venue.id)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
            let text = text.unwrap_or_else(|| {
                any_fallback = true;
                template_rationale(venue)
            });
            rationales.insert(venue.id.clone(), text);
        }

        let draft = if include_draft {
            narration
                .draft
                .filter(|d| !d.trim().is_empty())
                .or_else(|| {
                    any_fallback = true;
                    template_draft(state, &state.ranked)
                })
        } else {
            None
        };

        Ok(StageOutput::with_outcome(
            StageUpdate::Synthesis(SynthesisUpdate {
                summary,
                rationales,
                draft,
            }),
            any_fallback,
        ))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        StageUpdate::Synthesis(template_update(input.state))
    }
}
