//! Travel feasibility for the group, estimated from straight-line distance.

use async_trait::async_trait;
use pathfinder_core::{AccessProfile, Candidate, Coordinates, StageId, TravelMode};
use std::time::Duration;

use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::state::{StageUpdate, StateKey};

/// Road distance is longer than straight-line distance by roughly this factor.
const DETOUR_FACTOR: f64 = 1.3;
/// Travel times up to this many minutes score full marks.
const EASY_TRIP_MIN: f64 = 10.0;
/// Travel times past this many minutes score the minimum.
const LONG_TRIP_MIN: f64 = 60.0;
const MIN_ACCESS_SCORE: f64 = 0.1;

const MODE_WORDS: &[(&str, TravelMode)] = &[
    ("public transport", TravelMode::Transit),
    ("transit", TravelMode::Transit),
    ("subway", TravelMode::Transit),
    ("bus", TravelMode::Transit),
    ("ttc", TravelMode::Transit),
    ("on foot", TravelMode::Walking),
    ("walk", TravelMode::Walking),
    ("walking", TravelMode::Walking),
    ("bike", TravelMode::Cycling),
    ("biking", TravelMode::Cycling),
    ("cycling", TravelMode::Cycling),
    ("bicycle", TravelMode::Cycling),
];

/// Travel mode implied by the prompt, driving when nothing is said.
pub fn travel_mode(prompt: &str) -> TravelMode {
    let normalized = format!(
        " {} ",
        prompt
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    );
    MODE_WORDS
        .iter()
        .find(|(word, _)| normalized.contains(&format!(" {} ", word)))
        .map(|(_, mode)| *mode)
        .unwrap_or(TravelMode::Driving)
}

pub fn travel_minutes(from: &Coordinates, to: &Coordinates, mode: TravelMode) -> f64 {
    let km = from.distance_m(to) / 1000.0 * DETOUR_FACTOR;
    km / mode.speed_kmh() * 60.0
}

/// Score for the group's longest trip.
pub fn access_score(max_travel_min: f64) -> f64 {
    let score = if max_travel_min <= EASY_TRIP_MIN {
        1.0
    } else if max_travel_min <= LONG_TRIP_MIN {
        (1.0 - (max_travel_min - EASY_TRIP_MIN) / (LONG_TRIP_MIN - EASY_TRIP_MIN + 5.0))
            .max(MIN_ACCESS_SCORE)
    } else {
        MIN_ACCESS_SCORE
    };
    (score * 100.0).round() / 100.0
}

pub fn estimate(candidate: &Candidate, members: &[Coordinates], mode: TravelMode) -> AccessProfile {
    let times: Vec<f64> = members
        .iter()
        .filter(|m| m.is_valid())
        .map(|m| travel_minutes(m, &candidate.coordinates, mode))
        .collect();
    if times.is_empty() {
        return AccessProfile::unknown(mode);
    }

    let max = times.iter().copied().fold(0.0_f64, f64::max);
    let avg = times.iter().sum::<f64>() / times.len() as f64;
    AccessProfile {
        score: Some(access_score(max)),
        avg_travel_min: Some((avg * 10.0).round() / 10.0),
        max_travel_min: Some((max * 10.0).round() / 10.0),
        mode,
    }
}

pub struct AccessStage {
    timeout: Duration,
}

impl AccessStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for AccessStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Access, Granularity::PerCandidate, self.timeout)
            .reads(&[StateKey::Intent, StateKey::Candidates])
            .writes(&[StateKey::Access])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let request = &input.state.request;
        let mode = travel_mode(&request.prompt);
        let profiles = input
            .target_candidates()
            .map(|c| (c.id.clone(), estimate(c, &request.member_locations, mode)))
            .collect();
        Ok(StageOutput::completed(StageUpdate::Access(profiles)))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        let mode = travel_mode(&input.state.request.prompt);
        StageUpdate::Access(
            input
                .target_candidates()
                .map(|c| (c.id.clone(), AccessProfile::unknown(mode)))
                .collect(),
        )
    }
}
