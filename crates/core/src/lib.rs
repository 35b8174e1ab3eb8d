//! Domain types shared by the Pathfinder crates.
//!
//! Everything a caller sends or receives, plus the value types the pipeline
//! stages exchange, lives here so the orchestrator, server and event stream
//! agree on one wire format.

pub mod domain;
pub mod error;

pub use domain::enrichment::*;
pub use domain::intent::*;
pub use domain::plan::*;
pub use domain::stage::*;
pub use domain::venue::*;
pub use error::CoreError;
