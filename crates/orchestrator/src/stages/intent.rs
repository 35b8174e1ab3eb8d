//! Intent parsing: what the user wants, how hard it is, which stages run.

use async_trait::async_trait;
use pathfinder_core::{
    BudgetTier, ComplexityTier, Dimension, ParsedIntent, PlanRequest, PreferenceProfile, StageId,
    StageSet, MAX_GROUP_SIZE,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::adapters::{invoke, IntentPrompt, IntentReading, ProfileQuery};
use crate::core::{Granularity, Stage, StageContract, StageInput, StageOutput};
use crate::error::AdapterError;
use crate::scoring::default_weight;
use crate::state::{IntentUpdate, StageUpdate, StateKey};

/// Extra weight given to a dimension the user's profile cares about.
const PROFILE_NUDGE: f64 = 0.15;

const BUDGET_WORDS: &[(&str, BudgetTier)] = &[
    ("cheap", BudgetTier::Low),
    ("budget", BudgetTier::Low),
    ("affordable", BudgetTier::Low),
    ("inexpensive", BudgetTier::Low),
    ("free", BudgetTier::Low),
    ("moderate", BudgetTier::Medium),
    ("mid-range", BudgetTier::Medium),
    ("reasonable", BudgetTier::Medium),
    ("upscale", BudgetTier::High),
    ("fancy", BudgetTier::High),
    ("luxury", BudgetTier::High),
    ("splurge", BudgetTier::High),
    ("expensive", BudgetTier::High),
];

const VIBE_WORDS: &[&str] = &[
    "cozy",
    "chill",
    "relaxed",
    "lively",
    "romantic",
    "quiet",
    "energetic",
    "casual",
    "trendy",
    "competitive",
    "outdoor",
    "family-friendly",
];

const ACTIVITY_WORDS: &[&str] = &[
    "escape room",
    "mini golf",
    "board games",
    "axe throwing",
    "basketball",
    "bowling",
    "karaoke",
    "climbing",
    "pickleball",
    "badminton",
    "volleyball",
    "tennis",
    "soccer",
    "billiards",
    "arcade",
    "trivia",
    "yoga",
    "hiking",
    "picnic",
    "museum",
    "movie",
    "brunch",
    "dinner",
    "lunch",
    "coffee",
    "drinks",
    "bar",
];

static GROUP_SIZE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static ACTION_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static LOCATION_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn group_size_pattern() -> Option<&'static Regex> {
    GROUP_SIZE_PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(?:for|group of|party of|team of)\s+(\d{1,3})\b|\b(\d{1,3})\s+(?:people|friends|of us|persons|guests|players|coworkers)\b",
            )
            .ok()
        })
        .as_ref()
}

fn action_pattern() -> Option<&'static Regex> {
    ACTION_PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(?:e-?mail|send (?:out )?(?:an? )?invit(?:e|ation)s?)\b").ok()
        })
        .as_ref()
}

fn location_pattern() -> Option<&'static Regex> {
    LOCATION_PATTERN
        .get_or_init(|| {
            Regex::new(r"\b(?i:in|near|around)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*)").ok()
        })
        .as_ref()
}

/// Lowercased prompt padded with spaces, punctuation folded to spaces, so
/// vocabulary entries can be matched as ` word `.
fn normalize(prompt: &str) -> String {
    let folded: String = prompt
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { ' ' })
        .collect();
    format!(" {} ", folded.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase))
}

/// Deterministic reading of a prompt from fixed vocabularies, used when the
/// language model is unavailable.
pub fn keyword_reading(prompt: &str) -> IntentReading {
    let normalized = normalize(prompt);

    let budget = BUDGET_WORDS
        .iter()
        .find(|(word, _)| contains_phrase(&normalized, word))
        .map(|(_, tier)| *tier);
    let vibe = VIBE_WORDS
        .iter()
        .find(|word| contains_phrase(&normalized, word))
        .map(|w| w.to_string());
    let activity = ACTIVITY_WORDS
        .iter()
        .find(|word| contains_phrase(&normalized, word))
        .map(|w| w.to_string());
    let group_size = group_size_pattern()
        .and_then(|re| re.captures(prompt))
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| (1..=MAX_GROUP_SIZE).contains(n));
    let requested_action = action_pattern()
        .filter(|re| re.is_match(prompt))
        .map(|_| "send_email".to_string());
    let location = location_pattern()
        .and_then(|re| re.captures(prompt))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let matched_any = budget.is_some()
        || vibe.is_some()
        || activity.is_some()
        || group_size.is_some()
        || requested_action.is_some();

    let (complexity, stages) = if !matched_any {
        (ComplexityTier::MultiFactor, Some(StageId::OPTIONAL.to_vec()))
    } else if requested_action.is_some() {
        (ComplexityTier::Strategic, None)
    } else if budget.is_some() || vibe.is_some() || group_size.map_or(false, |n| n > 1) {
        (ComplexityTier::MultiFactor, None)
    } else {
        (ComplexityTier::Simple, None)
    };

    IntentReading {
        intent: ParsedIntent {
            activity,
            group_size: group_size.unwrap_or(1),
            budget,
            location,
            vibe,
            requested_action,
        },
        complexity: Some(complexity),
        stages,
        weights: BTreeMap::new(),
    }
}

fn nudge(weights: &mut BTreeMap<Dimension, f64>, dimension: Dimension) {
    let weight = weights
        .entry(dimension)
        .or_insert_with(|| default_weight(dimension));
    *weight = (*weight + PROFILE_NUDGE).min(1.0);
}

/// Merge a reading with the request's explicit hints and the user's profile.
pub fn build_update(
    request: &PlanRequest,
    reading: IntentReading,
    profile: Option<PreferenceProfile>,
) -> IntentUpdate {
    let mut intent = reading.intent;

    if request.group_size > 1 || intent.group_size == 0 {
        intent.group_size = request.group_size;
    }
    intent.group_size = intent.group_size.clamp(1, MAX_GROUP_SIZE);
    if let Some(budget) = request.budget_tier() {
        intent.budget = Some(budget);
    }
    if let Some(ref location) = request.location {
        intent.location = Some(location.clone());
    }
    if let Some(ref vibe) = request.vibe {
        intent.vibe = Some(vibe.clone());
    }

    let complexity = reading.complexity.unwrap_or_default();
    let active = match reading.stages {
        Some(stages) => StageSet::from_optional(stages.into_iter().filter(|s| !s.is_mandatory())),
        None => complexity.default_stages(),
    };

    let mut weights: BTreeMap<Dimension, f64> = reading
        .weights
        .into_iter()
        .filter(|(_, w)| w.is_finite())
        .map(|(d, w)| (d, w.clamp(0.0, 1.0)))
        .collect();

    if let Some(ref profile) = profile {
        if profile.budget_sensitive {
            nudge(&mut weights, Dimension::Value);
            intent.budget.get_or_insert(BudgetTier::Low);
        }
        if profile.accessibility_needs {
            nudge(&mut weights, Dimension::Access);
        }
        if intent.vibe.is_none() {
            intent.vibe = profile.preferred_vibes.first().cloned();
        }
    }

    IntentUpdate {
        intent,
        complexity,
        active,
        weights,
        profile,
    }
}

pub struct IntentStage {
    timeout: Duration,
}

impl IntentStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Stage for IntentStage {
    fn contract(&self) -> StageContract {
        StageContract::new(StageId::Intent, Granularity::PerRun, self.timeout)
            .writes(&[StateKey::Intent])
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageOutput, AdapterError> {
        let request = &input.state.request;
        let call_timeout = input.call_timeout();
        let prompt = IntentPrompt {
            prompt: request.prompt.clone(),
            prior_turns: request.prior_turns.clone(),
            group_size: request.group_size,
            budget: request.budget.clone(),
            location: request.location.clone(),
            vibe: request.vibe.clone(),
        };

        let profile = async {
            let user_id = request.user_id.clone()?;
            let raw = invoke(
                input.capabilities.identity.as_ref(),
                &ProfileQuery { user_id },
                call_timeout,
            )
            .await
            .ok()?;
            Some(PreferenceProfile::sanitize(&raw))
        };
        let reading = invoke(input.capabilities.intent_model.as_ref(), &prompt, call_timeout);

        let (reading, profile) = tokio::join!(reading, profile);
        let (reading, degraded) = match reading {
            Ok(reading) => (reading, false),
            Err(_) => (keyword_reading(&request.prompt), true),
        };
        let update = build_update(request, reading, profile);
        debug!(
            complexity = update.complexity.as_str(),
            stages = ?update.active.to_vec(),
            degraded,
            "Intent parsed"
        );

        Ok(StageOutput::with_outcome(
            StageUpdate::Intent(Box::new(update)),
            degraded,
        ))
    }

    fn fallback(&self, input: &StageInput<'_>) -> StageUpdate {
        let request = &input.state.request;
        StageUpdate::Intent(Box::new(build_update(
            request,
            keyword_reading(&request.prompt),
            None,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::Scripted;
    use crate::adapters::Capabilities;
    use crate::core::execute;
    use crate::state::ExecutionState;
    use pathfinder_core::StageOutcome;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_keyword_reading_extracts_vocabulary() {
        let reading = keyword_reading("Cheap basketball court for 6 near Trinity Bellwoods, something chill");
        assert_eq!(reading.intent.activity.as_deref(), Some("basketball"));
        assert_eq!(reading.intent.budget, Some(BudgetTier::Low));
        assert_eq!(reading.intent.group_size, 6);
        assert_eq!(reading.intent.vibe.as_deref(), Some("chill"));
        assert_eq!(reading.intent.location.as_deref(), Some("Trinity Bellwoods"));
        assert_eq!(reading.complexity, Some(ComplexityTier::MultiFactor));
        assert!(reading.stages.is_none());
    }

    #[test]
    fn test_keyword_patterns_compile() {
        assert!(group_size_pattern().is_some());
        assert!(action_pattern().is_some());
        assert!(location_pattern().is_some());
    }

    #[test]
    fn test_keyword_reading_word_boundaries() {
        let reading = keyword_reading("somewhere inexpensive");
        assert_eq!(reading.intent.budget, Some(BudgetTier::Low));
    }

    #[test]
    fn test_keyword_reading_no_match_runs_everything() {
        let reading = keyword_reading("surprise me");
        assert_eq!(reading.complexity, Some(ComplexityTier::MultiFactor));
        assert_eq!(reading.stages, Some(StageId::OPTIONAL.to_vec()));

        let update = build_update(&PlanRequest::new("surprise me"), reading, None);
        assert_eq!(update.active, StageSet::all());
    }

    #[test]
    fn test_keyword_reading_action_is_strategic() {
        let reading = keyword_reading("karaoke for 8 and email everyone the plan");
        assert_eq!(reading.intent.requested_action.as_deref(), Some("send_email"));
        assert_eq!(reading.complexity, Some(ComplexityTier::Strategic));
    }

    #[test]
    fn test_keyword_reading_activity_only_is_simple() {
        let reading = keyword_reading("bowling tonight");
        assert_eq!(reading.complexity, Some(ComplexityTier::Simple));
    }

    #[test]
    fn test_request_hints_override_reading() {
        let request = PlanRequest::new("bowling")
            .with_group_size(12)
            .with_budget("$$$")
            .with_vibe("lively");
        let update = build_update(&request, keyword_reading("cheap bowling"), None);
        assert_eq!(update.intent.group_size, 12);
        assert_eq!(update.intent.budget, Some(BudgetTier::High));
        assert_eq!(update.intent.vibe.as_deref(), Some("lively"));
    }

    #[test]
    fn test_model_stage_list_keeps_mandatory() {
        let reading = IntentReading {
            stages: Some(vec![StageId::Cost, StageId::Intent]),
            ..Default::default()
        };
        let update = build_update(&PlanRequest::new("x"), reading, None);
        assert_eq!(update.active, StageSet::from_optional([StageId::Cost]));
    }

    #[test]
    fn test_profile_nudges_weights() {
        let profile = PreferenceProfile {
            budget_sensitive: true,
            accessibility_needs: true,
            preferred_vibes: vec!["cozy".into()],
            ..Default::default()
        };
        let reading = IntentReading {
            weights: BTreeMap::from([(Dimension::Value, 0.9), (Dimension::Fit, 7.0)]),
            ..Default::default()
        };
        let update = build_update(&PlanRequest::new("x"), reading, Some(profile));
        assert_eq!(update.weights[&Dimension::Value], 1.0);
        assert_eq!(update.weights[&Dimension::Fit], 1.0);
        assert!((update.weights[&Dimension::Access] - 0.25).abs() < 1e-9);
        assert_eq!(update.intent.budget, Some(BudgetTier::Low));
        assert_eq!(update.intent.vibe.as_deref(), Some("cozy"));
    }

    #[tokio::test]
    async fn test_stage_uses_model_and_sanitized_profile() {
        let model = Scripted::new("llm", |_: &IntentPrompt, _| {
            Ok(IntentReading {
                intent: ParsedIntent {
                    activity: Some("climbing".into()),
                    ..Default::default()
                },
                complexity: Some(ComplexityTier::Simple),
                ..Default::default()
            })
        });
        let identity = Scripted::new("auth", |_: &ProfileQuery, _| {
            Ok(json!({"budget_sensitive": true, "email": "x@example.com"}))
        });
        let caps = Capabilities::unconfigured()
            .with_intent_model(Arc::new(model))
            .with_identity(Arc::new(identity));
        let state = ExecutionState::new(
            PlanRequest::new("climbing gym").with_user("auth0|1"),
            2,
            Duration::from_secs(30),
        );

        let stage = IntentStage::new(Duration::from_secs(5));
        let report = execute(&stage, &state, &caps, &[]).await.unwrap();
        assert_eq!(report.outcome, StageOutcome::Completed);
        let StageUpdate::Intent(update) = report.update else {
            panic!("expected intent update");
        };
        assert_eq!(update.intent.activity.as_deref(), Some("climbing"));
        assert_eq!(update.complexity, ComplexityTier::Simple);
        assert!(update.profile.as_ref().map_or(false, |p| p.budget_sensitive));
    }

    #[tokio::test]
    async fn test_stage_falls_back_to_keywords() {
        let caps = Capabilities::unconfigured();
        let state = ExecutionState::new(
            PlanRequest::new("cheap karaoke for 5"),
            2,
            Duration::from_secs(30),
        );

        let stage = IntentStage::new(Duration::from_secs(5));
        let report = execute(&stage, &state, &caps, &[]).await.unwrap();
        assert_eq!(report.outcome, StageOutcome::Fallback);
        let StageUpdate::Intent(update) = report.update else {
            panic!("expected intent update");
        };
        assert_eq!(update.intent.activity.as_deref(), Some("karaoke"));
        assert_eq!(update.intent.group_size, 5);
        assert!(update.profile.is_none());
    }
}
