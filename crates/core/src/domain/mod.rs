pub mod enrichment;
pub mod intent;
pub mod plan;
pub mod stage;
pub mod venue;
