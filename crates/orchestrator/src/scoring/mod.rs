//! Pure scoring functions: price conflict resolution and the weighted
//! composite ranking. Nothing here calls an external capability.

mod composite;
mod price;

pub use composite::{
    default_weight, dimension_score, rank, score_candidate, shortlist, ScoredCandidate, Weights,
    NEUTRAL_SCORE,
};
pub use price::{cost_profile, resolve_price, value_score};
