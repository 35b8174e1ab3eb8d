//! Core abstractions for the pipeline execution model.
//!
//! - [`Stage`] - Trait every pipeline stage implements
//! - [`StageContract`] - Declared reads, writes, granularity and timeout
//! - [`execute`] - Runs one stage with timeout and fallback substitution
//! - [`FanOut`] - Runs independent stages concurrently
//! - [`ProgressEmitter`] - Ordered per-request progress events

mod executor;
mod fanout;
mod progress;

pub use executor::{
    execute, Granularity, Stage, StageContract, StageInput, StageOutput, StageReport,
};
pub use fanout::FanOut;
pub use progress::ProgressEmitter;
