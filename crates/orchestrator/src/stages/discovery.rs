//! Candidate discovery across every configured source.

use async_trait::async_trait;
use futures::future::join_all;
use pathfinder_core::{Candidate, Coordinates, StageId};
use std::time::Duration;
use tracing::debug;

use crate::adapters::{invoke, DiscoveryQuery};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::state::{StageUpdate, StateKey};

/// Mean of the group members' positions.
pub fn centroid(points: &[Coordinates]) -> Option<Coordinates> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lng = points.iter().map(|p| p.lng).sum::<f64>() / n;
    Some(Coordinates::new(lat, lng))
}

fn same_venue(a: &Candidate, b: &Candidate, radius_m: f64) -> bool {
    a.normalized_name() == b.normalized_name()
        && a.coordinates.distance_m(&b.coordinates) <= radius_m
}

/// Label a source record with where it came from.
fn tag(mut candidate: Candidate, source: &str) -> Candidate {
    if !candidate.sources.iter().any(|s| s == source) {
        candidate.sources.push(source.to_string());
    }
    for signal in candidate.price_signals.iter_mut() {
        if signal.source.is_empty() {
            signal.source = source.to_string();
        }
    }
    candidate
}

/// Fold `other` into `base`: union of sources, price signals base lacks,
/// and descriptive fields base leaves empty.
fn absorb(base: &mut Candidate, other: Candidate) {
    for source in other.sources {
        if !base.sources.contains(&source) {
            base.sources.push(source);
        }
    }
    for signal in other.price_signals {
        if !base.price_signals.iter().any(|s| s.source == signal.source) {
            base.price_signals.push(signal);
        }
    }
    if base.address.is_empty() {
        base.address = other.address;
    }
    if base.category.is_none() {
        base.category = other.category;
    }
    if base.rating.is_none() {
        base.rating = other.rating;
    }
}

/// Add a record to the merged list, collapsing it into an existing record
/// for the same venue. The higher-rated record supplies the fields; the
/// first-seen id is kept.
pub fn merge_candidate(merged: &mut Vec<Candidate>, incoming: Candidate, radius_m: f64) {
    let Some(existing) = merged
        .iter_mut()
        .find(|c| same_venue(c, &incoming, radius_m))
    else {
        let mut incoming = incoming;
        if merged.iter().any(|c| c.id == incoming.id) {
            let prefix = incoming.sources.first().cloned().unwrap_or_default();
            incoming.id = format!("{}:{}", prefix, incoming.id);
        }
        merged.push(incoming);
        return;
    };

    if incoming.rating_or_zero() > existing.rating_or_zero() {
        let id = existing.id.clone();
        let previous = std::mem::replace(existing, incoming);
        existing.id = id;
        absorb(existing, previous);
    } else {
        absorb(existing, incoming);
    }
}

pub struct DiscoveryStage {
    timeout: Duration,
    cap: usize,
    dedup_radius_m: f64,
}

impl DiscoveryStage {
    pub fn new(timeout: Duration, cap: usize, dedup_radius_m: f64) -> Self {
        Self {
            timeout,
            cap,
            dedup_radius_m,
        }
    }
}

#[async_trait]
impl Stage for DiscoveryStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Discovery, Granularity::PerRun, self.timeout)
            .reads(&[StateKey::Intent, StateKey::Candidates])
            .writes(&[StateKey::Candidates])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let state = input.state;
        let sources = &input.capabilities.sources;
        if sources.is_empty() {
            return Err(AdapterError::unavailable("discovery", "no sources configured"));
        }

        let query = DiscoveryQuery {
            query: state.intent.search_query(&state.request.prompt).to_string(),
            location: state.intent.location.clone(),
            near: centroid(&state.request.member_locations),
            exclude_ids: state.seen_ids().cloned().collect(),
            limit: self.cap,
        };
        let call_timeout = input.call_timeout();
        let query = &query;

        let results = join_all(sources.iter().map(|source| async move {
            let found = invoke(source.as_ref(), query, call_timeout).await;
            (source.name().to_string(), found)
        }))
        .await;

        let mut merged = Vec::new();
        let mut last_error = None;
        let mut failures = 0;
        for (source, found) in results {
            match found {
                Ok(candidates) => {
                    for candidate in candidates {
                        let candidate = tag(candidate, &source);
                        let already_known = state.is_seen(&candidate.id)
                            || state
                                .candidates
                                .iter()
                                .any(|c| same_venue(c, &candidate, self.dedup_radius_m));
                        if !already_known {
                            merge_candidate(&mut merged, candidate, self.dedup_radius_m);
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == sources.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        merged.retain(|c| !state.is_seen(&c.id));
        merged.truncate(self.cap);
        debug!(
            request_id = %state.request_id,
            found = merged.len(),
            failed_sources = failures,
            "Discovery merged"
        );
        Ok(StageOutput::with_outcome(
            StageUpdate::Candidates(merged),
            failures > 0,
        ))
    }

    fn fallback(&self, _input: &StageInput<'_>) -> StageUpdate {
        StageUpdate::Candidates(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::Scripted;
    use crate::adapters::Capabilities;
    use crate::core::execute;
    use crate::state::ExecutionState;
    use pathfinder_core::{PlanRequest, PriceTier, StageOutcome};
    use std::sync::Arc;

    fn venue(id: &str, name: &str, lat: f64, rating: f64) -> Candidate {
        Candidate::new(id, name, Coordinates::new(lat, -79.4)).with_rating(rating)
    }

    fn state() -> ExecutionState {
        ExecutionState::new(PlanRequest::new("bowling"), 2, Duration::from_secs(30))
    }

    fn stage() -> DiscoveryStage {
        DiscoveryStage::new(Duration::from_secs(5), 10, 100.0)
    }

    #[test]
    fn test_merge_keeps_higher_rated_record_and_unions_sources() {
        let mut merged = Vec::new();
        merge_candidate(
            &mut merged,
            tag(venue("g-1", "Bowl O Rama", 43.65, 4.1).with_price("google", PriceTier::Moderate), "google"),
            100.0,
        );
        merge_candidate(
            &mut merged,
            tag(
                venue("y-9", "bowl  o  rama", 43.6502, 4.6)
                    .with_address("12 Queen St")
                    .with_price("yelp", PriceTier::Budget),
                "yelp",
            ),
            100.0,
        );

        assert_eq!(merged.len(), 1);
        let record = &merged[0];
        assert_eq!(record.id, "g-1");
        assert_eq!(record.rating, Some(4.6));
        assert_eq!(record.address, "12 Queen St");
        assert_eq!(record.sources, vec!["yelp".to_string(), "google".to_string()]);
        assert_eq!(record.price_signals.len(), 2);
    }

    #[test]
    fn test_same_name_far_apart_is_kept() {
        let mut merged = Vec::new();
        merge_candidate(&mut merged, venue("a", "Pins", 43.65, 4.0), 100.0);
        merge_candidate(&mut merged, venue("b", "Pins", 43.70, 4.0), 100.0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_id_collision_prefixed_with_source() {
        let mut merged = Vec::new();
        merge_candidate(&mut merged, tag(venue("42", "Alpha", 43.65, 4.0), "google"), 100.0);
        merge_candidate(&mut merged, tag(venue("42", "Beta", 43.70, 4.0), "yelp"), 100.0);
        assert_eq!(merged[1].id, "yelp:42");
    }

    #[test]
    fn test_centroid() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[Coordinates::new(1.0, 2.0), Coordinates::new(3.0, 4.0)]).unwrap();
        assert_eq!((c.lat, c.lng), (2.0, 3.0));
    }

    #[tokio::test]
    async fn test_queries_all_sources_and_skips_seen() {
        let google = Scripted::new("google", |_: &DiscoveryQuery, _| {
            Ok(vec![venue("a", "Alpha Lanes", 43.60, 4.0), venue("b", "Beta Bowl", 43.61, 4.2)])
        });
        let yelp = Scripted::new("yelp", |q: &DiscoveryQuery, _| {
            assert_eq!(q.query, "bowling");
            Ok(vec![venue("c", "Gamma Games", 43.62, 3.9)])
        });
        let caps = Capabilities::unconfigured()
            .with_source(Arc::new(google))
            .with_source(Arc::new(yelp));

        let mut state = state();
        state
            .apply(StageUpdate::Candidates(vec![venue("a", "Alpha Lanes", 43.60, 4.0)]))
            .unwrap();

        let report = execute(&stage(), &state, &caps, &[]).await.unwrap();
        assert_eq!(report.outcome, StageOutcome::Completed);
        let StageUpdate::Candidates(found) = report.update else {
            panic!("expected candidates");
        };
        let ids: Vec<_> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(found[1].sources, vec!["yelp".to_string()]);
    }

    #[tokio::test]
    async fn test_partial_source_failure_is_degraded() {
        let google = Scripted::new("google", |_: &DiscoveryQuery, _| {
            Ok(vec![venue("a", "Alpha", 43.6, 4.0)])
        });
        let caps = Capabilities::unconfigured()
            .with_source(Arc::new(google))
            .with_source(Arc::new(Scripted::failing("yelp")));

        let report = execute(&stage(), &state(), &caps, &[]).await.unwrap();
        assert_eq!(report.outcome, StageOutcome::Fallback);
        assert!(matches!(report.update, StageUpdate::Candidates(ref v) if v.len() == 1));
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_nothing() {
        let caps = Capabilities::unconfigured().with_source(Arc::new(Scripted::failing("google")));
        let report = execute(&stage(), &state(), &caps, &[]).await.unwrap();
        assert_eq!(report.outcome, StageOutcome::Fallback);
        assert_eq!(report.update, StageUpdate::Candidates(vec![]));
    }

    #[tokio::test]
    async fn test_result_capped() {
        let google = Scripted::new("google", |_: &DiscoveryQuery, _| {
            Ok((0..20)
                .map(|i| venue(&format!("v{}", i), &format!("Venue {}", i), 43.6, 4.0))
                .collect())
        });
        let caps = Capabilities::unconfigured().with_source(Arc::new(google));
        let stage = DiscoveryStage::new(Duration::from_secs(5), 4, 100.0);

        let report = execute(&stage, &state(), &caps, &[]).await.unwrap();
        assert!(matches!(report.update, StageUpdate::Candidates(ref v) if v.len() == 4));
    }
}
