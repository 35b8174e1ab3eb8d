//! Progress events for Pathfinder planning requests
//!
//! This crate provides the event envelope, event types and the process-wide
//! bus that observers subscribe to.

mod bus;
mod types;

pub use bus::{EventBus, RequestReceiver};
pub use types::*;
