//! Request and response bodies exchanged with external capabilities.

use pathfinder_core::{
    Candidate, ChatTurn, ComplexityTier, Coordinates, Dimension, DimensionContribution,
    ParsedIntent, PriceTier, StageId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentPrompt {
    pub prompt: String,
    pub prior_turns: Vec<ChatTurn>,
    pub group_size: u32,
    pub budget: Option<String>,
    pub location: Option<String>,
    pub vibe: Option<String>,
}

/// The language model's structured reading of a prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentReading {
    #[serde(default)]
    pub intent: ParsedIntent,
    #[serde(default)]
    pub complexity: Option<ComplexityTier>,
    /// Optional stages to run; tier defaults apply when absent
    #[serde(default)]
    pub stages: Option<Vec<StageId>>,
    #[serde(default)]
    pub weights: BTreeMap<Dimension, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryQuery {
    pub query: String,
    pub location: Option<String>,
    /// Centroid of the group's locations, when known
    pub near: Option<Coordinates>,
    /// Ids already seen in this request
    pub exclude_ids: Vec<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitQuery {
    pub candidate_id: String,
    pub name: String,
    pub category: Option<String>,
    pub activity: Option<String>,
    pub vibe: Option<String>,
    pub preferred_vibes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuery {
    pub candidate_id: String,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceAnswer {
    pub price_tier: Option<PriceTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskQuery {
    pub candidate_id: String,
    pub name: String,
    pub coordinates: Coordinates,
    pub category: Option<String>,
    pub activity: Option<String>,
    pub group_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrationVenue {
    pub id: String,
    pub name: String,
    pub composite_score: f64,
    pub price_tier: Option<PriceTier>,
    pub breakdown: Vec<DimensionContribution>,
    pub risk_warning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrationRequest {
    pub prompt: String,
    pub activity: Option<String>,
    pub venues: Vec<NarrationVenue>,
    /// Ask for a shareable draft (e.g. an invite email) as well
    pub include_draft: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Narration {
    pub summary: String,
    /// Rationale per venue id
    #[serde(default)]
    pub rationales: BTreeMap<String, String>,
    #[serde(default)]
    pub draft: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileQuery {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsentRequest {
    pub user_id: String,
    pub action: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsentDecision {
    pub authorized: bool,
}

impl FitQuery {
    pub fn for_candidate(candidate: &Candidate, intent: &ParsedIntent, preferred_vibes: &[String]) -> Self {
        Self {
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            category: candidate.category.clone(),
            activity: intent.activity.clone(),
            vibe: intent.vibe.clone(),
            preferred_vibes: preferred_vibes.to_vec(),
        }
    }
}

impl RiskQuery {
    pub fn for_candidate(candidate: &Candidate, intent: &ParsedIntent) -> Self {
        Self {
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            coordinates: candidate.coordinates,
            category: candidate.category.clone(),
            activity: intent.activity.clone(),
            group_size: intent.group_size,
        }
    }
}
