//! Cross-source price conflict resolution.

use pathfinder_core::{CostProfile, PriceConfidence, PriceSignal, PriceTier};

/// Resolve per-source price signals into one tier and a confidence.
///
/// | signals                  | tier                       | confidence |
/// |--------------------------|----------------------------|------------|
/// | none                     | none                       | none       |
/// | one                      | that tier                  | medium     |
/// | several, spread <= 1     | median, ties to cheaper    | high       |
/// | several, spread > 1      | median, ties to cheaper    | low        |
pub fn resolve_price(signals: &[PriceSignal]) -> (Option<PriceTier>, PriceConfidence) {
    let mut levels: Vec<u8> = signals.iter().map(|s| s.tier.level()).collect();
    levels.sort_unstable();

    let (Some(&lowest), Some(&highest)) = (levels.first(), levels.last()) else {
        return (None, PriceConfidence::None);
    };
    if levels.len() == 1 {
        return (PriceTier::from_level(lowest), PriceConfidence::Medium);
    }

    let mid = levels.len() / 2;
    let median = if levels.len() % 2 == 1 {
        levels[mid]
    } else {
        // Integer division rounds a half-step tie down, toward cheaper.
        (levels[mid - 1] + levels[mid]) / 2
    };
    let confidence = if highest - lowest <= 1 {
        PriceConfidence::High
    } else {
        PriceConfidence::Low
    };
    (PriceTier::from_level(median), confidence)
}

/// Value-for-money score: cheaper tiers score higher, lower confidence costs
/// a little, an unknown price is below average.
pub fn value_score(tier: Option<PriceTier>, confidence: PriceConfidence) -> f64 {
    let Some(tier) = tier else {
        return 0.3;
    };
    let base = match tier {
        PriceTier::Budget => 0.8,
        PriceTier::Moderate => 0.6,
        PriceTier::Upscale => 0.4,
        PriceTier::Luxury => 0.2,
    };
    let penalty = match confidence {
        PriceConfidence::Low => 0.1,
        PriceConfidence::Medium => 0.05,
        PriceConfidence::High | PriceConfidence::None => 0.0,
    };
    let score: f64 = base - penalty;
    (score.max(0.1) * 10_000.0).round() / 10_000.0
}

pub fn cost_profile(tier: Option<PriceTier>, confidence: PriceConfidence) -> CostProfile {
    CostProfile {
        price_tier: tier,
        confidence,
        value_score: value_score(tier, confidence),
    }
}
