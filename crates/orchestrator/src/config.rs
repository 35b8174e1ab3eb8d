use pathfinder_core::StageId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-stage call budgets in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub intent_ms: u64,
    pub discovery_ms: u64,
    pub fit_ms: u64,
    pub cost_ms: u64,
    pub access_ms: u64,
    pub risk_ms: u64,
    pub synthesis_ms: u64,
    pub action_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            intent_ms: 8_000,
            discovery_ms: 8_000,
            fit_ms: 6_000,
            cost_ms: 4_000,
            access_ms: 4_000,
            risk_ms: 6_000,
            synthesis_ms: 10_000,
            action_ms: 4_000,
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: StageId) -> Duration {
        let ms = match stage {
            StageId::Intent => self.intent_ms,
            StageId::Discovery => self.discovery_ms,
            StageId::Fit => self.fit_ms,
            StageId::Cost => self.cost_ms,
            StageId::Access => self.access_ms,
            StageId::Risk => self.risk_ms,
            StageId::Synthesis => self.synthesis_ms,
            StageId::Action => self.action_ms,
        };
        Duration::from_millis(ms)
    }

    /// Same budget for every stage.
    pub fn uniform(ms: u64) -> Self {
        Self {
            intent_ms: ms,
            discovery_ms: ms,
            fit_ms: ms,
            cost_ms: ms,
            access_ms: ms,
            risk_ms: ms,
            synthesis_ms: ms,
            action_ms: ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Re-discovery rounds allowed after a veto
    pub max_retries: u32,
    /// Minimum number of venues returned when that many were discovered
    pub floor: usize,
    pub top_n: usize,
    /// Ranked candidates the risk stage checks per attempt
    pub risk_window: usize,
    /// New candidates kept per discovery attempt
    pub discovery_cap: usize,
    /// Same-name venues closer than this are merged
    pub dedup_radius_m: f64,
    pub timeouts: StageTimeouts,
    /// Whole-request budget, bounds the retry loop
    pub deadline_ms: u64,
    /// Time that must remain before another attempt is started
    pub min_retry_budget_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            floor: 3,
            top_n: 3,
            risk_window: 5,
            discovery_cap: 10,
            dedup_radius_m: 100.0,
            timeouts: StageTimeouts::default(),
            deadline_ms: 30_000,
            min_retry_budget_ms: 5_000,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_floor(mut self, floor: usize) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_risk_window(mut self, window: usize) -> Self {
        self.risk_window = window;
        self
    }

    pub fn with_discovery_cap(mut self, cap: usize) -> Self {
        self.discovery_cap = cap;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn with_min_retry_budget(mut self, budget: Duration) -> Self {
        self.min_retry_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn min_retry_budget(&self) -> Duration {
        Duration::from_millis(self.min_retry_budget_ms)
    }

    pub fn timeout_for(&self, stage: StageId) -> Duration {
        self.timeouts.for_stage(stage)
    }

    /// Shortlist length: `top_n`, raised to `floor` when configured below it.
    pub fn shortlist_len(&self) -> usize {
        self.top_n.max(self.floor)
    }
}

/// One venue discovery source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub name: String,
    pub url: String,
}

/// Where each external capability lives. Unset entries run on fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityEndpoints {
    pub intent_model: Option<String>,
    pub fit_scorer: Option<String>,
    pub narrator: Option<String>,
    pub sources: Vec<SourceEndpoint>,
    pub price_lookup: Option<String>,
    pub risk_signals: Option<String>,
    pub risk_history: Option<String>,
    pub identity: Option<String>,
    pub consent: Option<String>,
    /// Sent as a bearer token to every endpoint
    pub api_key: Option<String>,
}
