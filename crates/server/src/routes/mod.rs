mod health;
mod plan;
pub mod sse;
mod ws;

pub use health::*;
pub use plan::*;
pub use ws::*;
