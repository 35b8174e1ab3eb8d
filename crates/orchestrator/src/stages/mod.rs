//! The eight pipeline stages.

mod access;
mod action;
mod cost;
mod discovery;
mod fit;
mod intent;
mod risk;
mod synthesis;

pub use access::{access_score, estimate, travel_minutes, travel_mode, AccessStage};
pub use action::{scopes_for, ActionStage};
pub use cost::CostStage;
pub use discovery::{centroid, merge_candidate, DiscoveryStage};
pub use fit::FitStage;
pub use intent::{build_update, keyword_reading, IntentStage};
pub use risk::RiskStage;
pub use synthesis::{template_draft, template_rationale, template_summary, SynthesisStage};

use pathfinder_core::StageId;

use crate::config::PipelineConfig;
use crate::core::Stage;

/// One instance of every stage, configured for a pipeline.
pub struct StageSuite {
    pub intent: IntentStage,
    pub discovery: DiscoveryStage,
    pub fit: FitStage,
    pub cost: CostStage,
    pub access: AccessStage,
    pub risk: RiskStage,
    pub synthesis: SynthesisStage,
    pub action: ActionStage,
}

impl StageSuite {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            intent: IntentStage::new(config.timeout_for(StageId::Intent)),
            discovery: DiscoveryStage::new(
                config.timeout_for(StageId::Discovery),
                config.discovery_cap,
                config.dedup_radius_m,
            ),
            fit: FitStage::new(config.timeout_for(StageId::Fit)),
            cost: CostStage::new(config.timeout_for(StageId::Cost)),
            access: AccessStage::new(config.timeout_for(StageId::Access)),
            risk: RiskStage::new(config.timeout_for(StageId::Risk)),
            synthesis: SynthesisStage::new(config.timeout_for(StageId::Synthesis)),
            action: ActionStage::new(config.timeout_for(StageId::Action)),
        }
    }

    /// The independent enrichment stages, in declaration order.
    pub fn enrichment(&self) -> [&dyn Stage; 3] {
        [&self.fit, &self.cost, &self.access]
    }
}
