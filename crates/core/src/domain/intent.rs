use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::venue::PriceTier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Low,
    Medium,
    High,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Accepts `low|medium|high` and `$`-notation (`$`/`$$` low..high).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" | "cheap" | "budget" => Some(Self::Low),
            "medium" | "moderate" | "mid" => Some(Self::Medium),
            "high" | "premium" | "luxury" => Some(Self::High),
            other => PriceTier::parse(other).map(Self::from_price),
        }
    }

    pub fn from_price(tier: PriceTier) -> Self {
        match tier {
            PriceTier::Budget => Self::Low,
            PriceTier::Moderate => Self::Medium,
            PriceTier::Upscale | PriceTier::Luxury => Self::High,
        }
    }
}

/// Structured reading of the user's prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ParsedIntent {
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default = "default_group_size")]
    pub group_size: u32,
    #[serde(default)]
    pub budget: Option<BudgetTier>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub vibe: Option<String>,
    /// Side-effecting follow-up the user asked for, e.g. `send_email`.
    #[serde(default)]
    pub requested_action: Option<String>,
}

fn default_group_size() -> u32 {
    1
}

impl Default for ParsedIntent {
    fn default() -> Self {
        Self {
            activity: None,
            group_size: default_group_size(),
            budget: None,
            location: None,
            vibe: None,
            requested_action: None,
        }
    }
}

impl ParsedIntent {
    /// Text to send to discovery: the activity, or the raw prompt without one.
    pub fn search_query<'a>(&'a self, raw_prompt: &'a str) -> &'a str {
        self.activity
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(raw_prompt)
    }
}

/// Preference profile from the identity provider, reduced to the keys the
/// pipeline is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PreferenceProfile {
    #[serde(default)]
    pub budget_sensitive: bool,
    #[serde(default)]
    pub accessibility_needs: bool,
    #[serde(default)]
    pub preferred_vibes: Vec<String>,
    #[serde(default)]
    pub dietary: Vec<String>,
    /// Actions the user has pre-approved the system to propose.
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

impl PreferenceProfile {
    const MAX_LIST_LEN: usize = 10;
    const MAX_ITEM_LEN: usize = 40;

    /// Build a profile from raw provider metadata, ignoring every key outside
    /// the whitelist and trimming oversized lists.
    pub fn sanitize(raw: &serde_json::Value) -> Self {
        let flag = |key: &str| raw.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
        let list = |key: &str| -> Vec<String> {
            raw.get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty() && s.len() <= Self::MAX_ITEM_LEN)
                        .take(Self::MAX_LIST_LEN)
                        .map(str::to_lowercase)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            budget_sensitive: flag("budget_sensitive"),
            accessibility_needs: flag("accessibility_needs"),
            preferred_vibes: list("preferred_vibes"),
            dietary: list("dietary"),
            allowed_actions: list("allowed_actions"),
        }
    }

    pub fn allows(&self, action: &str) -> bool {
        self.allowed_actions.iter().any(|a| a == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_budget_parse() {
        assert_eq!(BudgetTier::parse("LOW"), Some(BudgetTier::Low));
        assert_eq!(BudgetTier::parse("$$"), Some(BudgetTier::Medium));
        assert_eq!(BudgetTier::parse("$$$$"), Some(BudgetTier::High));
        assert_eq!(BudgetTier::parse("whatever"), None);
    }

    #[test]
    fn test_search_query_falls_back_to_prompt() {
        let mut intent = ParsedIntent::default();
        assert_eq!(intent.search_query("bowling night"), "bowling night");
        intent.activity = Some("bowling".into());
        assert_eq!(intent.search_query("bowling night"), "bowling");
    }

    #[test]
    fn test_intent_deserialize_defaults() {
        let intent: ParsedIntent = serde_json::from_str(r#"{"activity":"karaoke"}"#).unwrap();
        assert_eq!(intent.group_size, 1);
        assert!(intent.budget.is_none());
    }

    #[test]
    fn test_profile_sanitize_drops_unknown_keys() {
        let raw = json!({
            "budget_sensitive": true,
            "email": "someone@example.com",
            "preferred_vibes": ["Cozy", "", "x".repeat(100)],
            "allowed_actions": ["send_email"]
        });
        let profile = PreferenceProfile::sanitize(&raw);
        assert!(profile.budget_sensitive);
        assert_eq!(profile.preferred_vibes, vec!["cozy"]);
        assert!(profile.allows("send_email"));
        assert!(!profile.allows("book_table"));
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("example.com"));
    }
}
