//! Per-candidate values written by the enrichment and risk stages.
//!
//! Each value has an explicit low-confidence form so a failed lookup still
//! produces a complete, typed entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use super::venue::PriceTier;

/// Subjective fit of a venue to the requested vibe, in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FitScore {
    pub score: Option<f64>,
    pub confidence: f64,
}

impl FitScore {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score: Some(score.clamp(0.0, 1.0)),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Stand-in for a failed scoring call.
    pub fn unscored() -> Self {
        Self {
            score: None,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PriceConfidence {
    High,
    Medium,
    Low,
    #[default]
    None,
}

impl PriceConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

impl fmt::Display for PriceConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved price level for one venue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CostProfile {
    pub price_tier: Option<PriceTier>,
    pub confidence: PriceConfidence,
    /// Value-for-money score in [0, 1] derived from tier and confidence.
    pub value_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Walking,
    Cycling,
    Transit,
    #[default]
    Driving,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Transit => "transit",
            Self::Driving => "driving",
        }
    }

    /// Average door-to-door speed in km/h used for travel estimates.
    pub fn speed_kmh(&self) -> f64 {
        match self {
            Self::Walking => 4.8,
            Self::Cycling => 15.0,
            Self::Transit => 20.0,
            Self::Driving => 30.0,
        }
    }
}

/// Travel feasibility of a venue for the whole group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AccessProfile {
    /// Accessibility score in [0, 1]; `None` when it could not be estimated.
    pub score: Option<f64>,
    pub avg_travel_min: Option<f64>,
    pub max_travel_min: Option<f64>,
    pub mode: TravelMode,
}

impl AccessProfile {
    pub fn unknown(mode: TravelMode) -> Self {
        Self {
            score: None,
            avg_travel_min: None,
            max_travel_min: None,
            mode,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    /// Disqualifies the venue outright
    Dealbreaker,
}

impl RiskSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Dealbreaker => "dealbreaker",
        }
    }

    /// Amount subtracted from the risk dimension for one flag.
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Low => 0.05,
            Self::Medium => 0.15,
            Self::High => 0.30,
            Self::Dealbreaker => 0.60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RiskFlag {
    /// Category such as `weather`, `event`, `closure`, `history`.
    pub kind: String,
    pub description: String,
    pub severity: RiskSeverity,
}

impl RiskFlag {
    pub fn new(kind: impl Into<String>, description: impl Into<String>, severity: RiskSeverity) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            severity,
        }
    }
}

/// Outcome of the adversarial checks for one venue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RiskAssessment {
    pub flags: Vec<RiskFlag>,
    /// False when every lookup failed: the venue is unchecked, not safe.
    pub evaluated: bool,
}

impl RiskAssessment {
    pub fn checked(flags: Vec<RiskFlag>) -> Self {
        Self {
            flags,
            evaluated: true,
        }
    }

    pub fn unchecked() -> Self {
        Self::default()
    }

    pub fn is_dealbreaker(&self) -> bool {
        self.flags
            .iter()
            .any(|f| f.severity == RiskSeverity::Dealbreaker)
    }

    pub fn worst(&self) -> Option<RiskSeverity> {
        self.flags.iter().map(|f| f.severity).max()
    }

    /// Risk dimension score: 1.0 minus the summed penalties, clamped to [0, 1].
    pub fn risk_score(&self) -> f64 {
        let penalty: f64 = self.flags.iter().map(|f| f.severity.penalty()).sum();
        (1.0 - penalty).clamp(0.0, 1.0)
    }

    /// One-line warning for the ranked entry, empty when nothing was flagged.
    pub fn warning(&self) -> String {
        let mut flags: Vec<&RiskFlag> = self.flags.iter().collect();
        flags.sort_by(|a, b| b.severity.cmp(&a.severity));
        flags
            .iter()
            .map(|f| format!("[{}] {}", f.severity.as_str(), f.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
