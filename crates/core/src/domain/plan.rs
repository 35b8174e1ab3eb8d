use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::enrichment::PriceConfidence;
use super::intent::BudgetTier;
use super::stage::{ComplexityTier, StageId};
use super::venue::{Coordinates, PriceTier};
use crate::error::CoreError;

pub const MAX_PROMPT_LEN: usize = 2000;
pub const MAX_GROUP_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChatTurn {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

/// A venue planning request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PlanRequest {
    pub prompt: String,
    #[serde(default = "default_group_size")]
    pub group_size: u32,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub vibe: Option<String>,
    #[serde(default)]
    pub prior_turns: Vec<ChatTurn>,
    #[serde(default)]
    pub member_locations: Vec<Coordinates>,
    /// Identity handle for preference lookup and consent.
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_group_size() -> u32 {
    1
}

impl PlanRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            group_size: default_group_size(),
            budget: None,
            location: None,
            vibe: None,
            prior_turns: Vec::new(),
            member_locations: Vec::new(),
            user_id: None,
        }
    }

    pub fn with_group_size(mut self, group_size: u32) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_budget(mut self, budget: impl Into<String>) -> Self {
        self.budget = Some(budget.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_vibe(mut self, vibe: impl Into<String>) -> Self {
        self.vibe = Some(vibe.into());
        self
    }

    pub fn with_member_locations(mut self, locations: Vec<Coordinates>) -> Self {
        self.member_locations = locations;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Reject requests the pipeline cannot plan. Runs before any stage.
    pub fn validate(&self) -> Result<(), CoreError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::malformed("prompt", "must not be empty"));
        }
        if prompt.chars().count() > MAX_PROMPT_LEN {
            return Err(CoreError::malformed(
                "prompt",
                format!("must be at most {} characters", MAX_PROMPT_LEN),
            ));
        }
        if self.group_size == 0 || self.group_size > MAX_GROUP_SIZE {
            return Err(CoreError::malformed(
                "group_size",
                format!("must be between 1 and {}", MAX_GROUP_SIZE),
            ));
        }
        if let Some(budget) = self.budget.as_deref() {
            if BudgetTier::parse(budget).is_none() {
                return Err(CoreError::malformed(
                    "budget",
                    format!("unrecognized budget hint '{}'", budget),
                ));
            }
        }
        if let Some(i) = self.member_locations.iter().position(|c| !c.is_valid()) {
            return Err(CoreError::malformed(
                format!("member_locations[{}]", i),
                "latitude or longitude out of range",
            ));
        }
        if let Some(i) = self
            .prior_turns
            .iter()
            .position(|t| t.role != "user" && t.role != "assistant")
        {
            return Err(CoreError::malformed(
                format!("prior_turns[{}].role", i),
                "must be 'user' or 'assistant'",
            ));
        }
        Ok(())
    }

    pub fn budget_tier(&self) -> Option<BudgetTier> {
        self.budget.as_deref().and_then(BudgetTier::parse)
    }
}

/// A scoring dimension of the composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Fit,
    Value,
    Access,
    Risk,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Fit,
        Dimension::Value,
        Dimension::Access,
        Dimension::Risk,
    ];

    /// Stage whose output feeds this dimension.
    pub fn stage(&self) -> StageId {
        match self {
            Self::Fit => StageId::Fit,
            Self::Value => StageId::Cost,
            Self::Access => StageId::Access,
            Self::Risk => StageId::Risk,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Value => "value",
            Self::Access => "access",
            Self::Risk => "risk",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dimension's share of a composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DimensionContribution {
    pub dimension: Dimension,
    /// Normalized dimension score in [0, 1]
    pub score: f64,
    /// Normalized weight; weights of one entry sum to 1
    pub weight: f64,
    /// False when the candidate had no value and scored neutral
    pub evaluated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RankedVenue {
    pub rank: u32,
    pub id: String,
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub rating: Option<f64>,
    pub price_tier: Option<PriceTier>,
    pub price_confidence: PriceConfidence,
    pub fit_score: Option<f64>,
    pub composite_score: f64,
    pub breakdown: Vec<DimensionContribution>,
    pub rationale: String,
    /// Empty when no risk was found
    pub risk_warning: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Caller must obtain consent through its own flow
    AwaitingConsent,
    /// Consent provider authorized the action out of band
    Authorized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PendingAction {
    pub kind: String,
    pub justification: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub draft: Option<String>,
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ExecutionSummary {
    pub request_id: Uuid,
    pub complexity: ComplexityTier,
    pub active_stages: Vec<StageId>,
    /// Number of evaluation attempts, including the first
    pub attempts: u32,
    /// True when the retry budget ran out on a veto
    pub exhausted: bool,
    #[serde(default)]
    pub veto_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PlanResponse {
    pub venues: Vec<RankedVenue>,
    pub summary: String,
    #[serde(default)]
    pub pending_action: Option<PendingAction>,
    pub execution: ExecutionSummary,
}
