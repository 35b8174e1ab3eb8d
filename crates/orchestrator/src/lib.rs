pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod scoring;
pub mod stages;
pub mod state;
pub mod veto;

pub use adapters::Capabilities;
pub use config::{CapabilityEndpoints, PipelineConfig, SourceEndpoint, StageTimeouts};
pub use error::{AdapterError, OrchestratorError, Result};
pub use pipeline::PlanService;
pub use veto::{RetryController, VetoState, VetoStateMachine};
