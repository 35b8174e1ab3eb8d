//! Weighted composite scoring and ranking.

use pathfinder_core::{Candidate, Dimension, DimensionContribution, StageSet};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::state::ExecutionState;

/// Score used for a dimension the candidate has no value for.
pub const NEUTRAL_SCORE: f64 = 0.5;

pub fn default_weight(dimension: Dimension) -> f64 {
    match dimension {
        Dimension::Fit => 0.30,
        Dimension::Value => 0.35,
        Dimension::Access => 0.10,
        Dimension::Risk => 0.25,
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Normalized weights; inactive dimensions weigh 0 and the rest sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights(BTreeMap<Dimension, f64>);

impl Weights {
    /// Combine the request's weight overrides with the defaults.
    ///
    /// An override is used as given (clamped to [0, 1]); a dimension without
    /// one takes its default. If every active dimension ends up at 0 the
    /// defaults are used instead.
    pub fn resolve(overrides: &BTreeMap<Dimension, f64>, active: &StageSet) -> Self {
        let is_active = |d: Dimension| active.contains(d.stage());

        let mut raw: BTreeMap<Dimension, f64> = Dimension::ALL
            .into_iter()
            .map(|d| {
                let weight = if !is_active(d) {
                    0.0
                } else {
                    overrides
                        .get(&d)
                        .copied()
                        .filter(|w| w.is_finite())
                        .map(|w| w.clamp(0.0, 1.0))
                        .unwrap_or_else(|| default_weight(d))
                };
                (d, weight)
            })
            .collect();

        if raw.values().sum::<f64>() <= 0.0 {
            for (d, weight) in raw.iter_mut() {
                *weight = if is_active(*d) { default_weight(*d) } else { 0.0 };
            }
        }

        let total: f64 = raw.values().sum();
        if total > 0.0 {
            for weight in raw.values_mut() {
                *weight /= total;
            }
        }
        Self(raw)
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        self.0.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, w)| (*d, *w))
    }
}

/// A candidate with its composite score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a Candidate,
    /// Position in discovery order
    pub order: usize,
    pub composite: f64,
    pub breakdown: Vec<DimensionContribution>,
}

/// The candidate's normalized score for one dimension, `None` when the
/// dimension was not evaluated for it.
pub fn dimension_score(state: &ExecutionState, dimension: Dimension, id: &str) -> Option<f64> {
    match dimension {
        Dimension::Fit => state.fit.get(id).and_then(|f| f.score),
        Dimension::Value => state.cost.get(id).map(|c| c.value_score),
        Dimension::Access => state.access.get(id).and_then(|a| a.score),
        Dimension::Risk => state
            .risk
            .get(id)
            .filter(|r| r.evaluated)
            .map(|r| r.risk_score()),
    }
}

pub fn score_candidate<'a>(
    state: &ExecutionState,
    weights: &Weights,
    candidate: &'a Candidate,
    order: usize,
) -> ScoredCandidate<'a> {
    let breakdown: Vec<DimensionContribution> = weights
        .iter()
        .map(|(dimension, weight)| {
            let value = dimension_score(state, dimension, &candidate.id);
            DimensionContribution {
                dimension,
                score: value.map(|v| v.clamp(0.0, 1.0)).unwrap_or(NEUTRAL_SCORE),
                weight: round4(weight),
                evaluated: value.is_some(),
            }
        })
        .collect();

    let composite = weights
        .iter()
        .zip(&breakdown)
        .map(|((_, weight), part)| weight * part.score)
        .sum::<f64>();

    ScoredCandidate {
        candidate,
        order,
        composite: round4(composite),
        breakdown,
    }
}

/// Best first: composite, then raw rating, then discovery order.
fn compare(a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    b.composite
        .total_cmp(&a.composite)
        .then_with(|| {
            b.candidate
                .rating_or_zero()
                .total_cmp(&a.candidate.rating_or_zero())
        })
        .then_with(|| a.order.cmp(&b.order))
}

/// Score and sort every candidate accepted by `include`.
pub fn rank<'a>(
    state: &'a ExecutionState,
    weights: &Weights,
    include: impl Fn(&Candidate) -> bool,
) -> Vec<ScoredCandidate<'a>> {
    let mut scored: Vec<ScoredCandidate<'a>> = state
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| include(c))
        .map(|(order, c)| score_candidate(state, weights, c, order))
        .collect();
    scored.sort_by(compare);
    scored
}

/// Final shortlist: the best `top_n` viable candidates (`top_n` is raised to
/// `floor` when below it), topped up with the best excluded ones until
/// `floor` entries exist. Returns the shortlist and the ids that were
/// reinstated.
pub fn shortlist<'a>(
    state: &'a ExecutionState,
    weights: &Weights,
    top_n: usize,
    floor: usize,
) -> (Vec<ScoredCandidate<'a>>, Vec<String>) {
    let mut picked = rank(state, weights, |c| !state.is_excluded(&c.id));
    picked.truncate(top_n.max(floor));

    let mut reinstated = Vec::new();
    if picked.len() < floor {
        let excluded = rank(state, weights, |c| state.is_excluded(&c.id));
        for entry in excluded.into_iter().take(floor - picked.len()) {
            reinstated.push(entry.candidate.id.clone());
            picked.push(entry);
        }
    }
    (picked, reinstated)
}
