use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use utoipa::ToSchema;

use crate::error::CoreError;

/// Identifier of one pipeline unit.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Intent,
    Discovery,
    /// Subjective fit ("vibe") scoring
    Fit,
    Cost,
    /// Travel feasibility for the group
    Access,
    /// Adversarial weather/event/history checks
    Risk,
    Synthesis,
    /// Consent-gated side-effecting action
    Action,
}

impl StageId {
    pub const ALL: [StageId; 8] = [
        StageId::Intent,
        StageId::Discovery,
        StageId::Fit,
        StageId::Cost,
        StageId::Access,
        StageId::Risk,
        StageId::Synthesis,
        StageId::Action,
    ];

    /// Stages the intent parser may switch on or off.
    pub const OPTIONAL: [StageId; 5] = [
        StageId::Fit,
        StageId::Cost,
        StageId::Access,
        StageId::Risk,
        StageId::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Discovery => "discovery",
            Self::Fit => "fit",
            Self::Cost => "cost",
            Self::Access => "access",
            Self::Risk => "risk",
            Self::Synthesis => "synthesis",
            Self::Action => "action",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "intent" => Some(Self::Intent),
            "discovery" => Some(Self::Discovery),
            "fit" | "vibe" => Some(Self::Fit),
            "cost" => Some(Self::Cost),
            "access" => Some(Self::Access),
            "risk" => Some(Self::Risk),
            "synthesis" => Some(Self::Synthesis),
            "action" => Some(Self::Action),
            _ => None,
        }
    }

    /// Human-readable label used in progress events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Intent => "Understanding your request",
            Self::Discovery => "Finding candidate venues",
            Self::Fit => "Matching the vibe",
            Self::Cost => "Checking prices",
            Self::Access => "Estimating travel times",
            Self::Risk => "Looking for dealbreakers",
            Self::Synthesis => "Writing up the shortlist",
            Self::Action => "Preparing follow-up action",
        }
    }

    /// Intent, discovery and synthesis always run.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Intent | Self::Discovery | Self::Synthesis)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownStage(s.to_string()))
    }
}

/// How a stage execution resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    /// The capability failed or timed out and the fallback value was used
    Fallback,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    #[default]
    MultiFactor,
    Strategic,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::MultiFactor => "multi_factor",
            Self::Strategic => "strategic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" | "quick" | "tier_1" => Some(Self::Simple),
            "multi_factor" | "full" | "tier_2" => Some(Self::MultiFactor),
            "strategic" | "adversarial" | "tier_3" => Some(Self::Strategic),
            _ => None,
        }
    }

    /// Active stages used when the intent parser does not name them.
    pub fn default_stages(&self) -> StageSet {
        match self {
            Self::Simple => StageSet::from_optional([StageId::Cost, StageId::Risk]),
            Self::MultiFactor => StageSet::from_optional([
                StageId::Fit,
                StageId::Cost,
                StageId::Access,
                StageId::Risk,
            ]),
            Self::Strategic => StageSet::all(),
        }
    }
}

/// The set of stages allowed to run for one request.
///
/// Always contains the mandatory stages. Fixed once intent parsing finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct StageSet(BTreeSet<StageId>);

impl StageSet {
    pub fn all() -> Self {
        Self(StageId::ALL.into_iter().collect())
    }

    pub fn mandatory() -> Self {
        Self(StageId::ALL.into_iter().filter(|s| s.is_mandatory()).collect())
    }

    /// Mandatory stages plus the given optional ones.
    pub fn from_optional(stages: impl IntoIterator<Item = StageId>) -> Self {
        let mut set = Self::mandatory();
        set.0.extend(stages);
        set
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.0.contains(&stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = StageId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<StageId> {
        self.0.iter().copied().collect()
    }
}

impl Default for StageSet {
    fn default() -> Self {
        Self::mandatory()
    }
}
