use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::CoreError;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in metres.
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        let (lat1, lng1) = (self.lat.to_radians(), self.lng.to_radians());
        let (lat2, lng2) = (other.lat.to_radians(), other.lng.to_radians());
        let dlat = lat2 - lat1;
        let dlng = lng2 - lng1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        EARTH_RADIUS_M * 2.0 * a.sqrt().asin()
    }
}

/// Price level in the usual `$`..`$$$$` notation.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum PriceTier {
    #[serde(rename = "$")]
    Budget,
    #[serde(rename = "$$")]
    Moderate,
    #[serde(rename = "$$$")]
    Upscale,
    #[serde(rename = "$$$$")]
    Luxury,
}

impl PriceTier {
    pub fn level(&self) -> u8 {
        match self {
            Self::Budget => 1,
            Self::Moderate => 2,
            Self::Upscale => 3,
            Self::Luxury => 4,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Budget),
            2 => Some(Self::Moderate),
            3 => Some(Self::Upscale),
            4 => Some(Self::Luxury),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Budget => "$",
            Self::Moderate => "$$",
            Self::Upscale => "$$$",
            Self::Luxury => "$$$$",
        }
    }

    /// Accepts `$`-notation as well as the provider spellings
    /// `PRICE_LEVEL_INEXPENSIVE` .. `PRICE_LEVEL_VERY_EXPENSIVE`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "$" | "PRICE_LEVEL_INEXPENSIVE" | "inexpensive" => Some(Self::Budget),
            "$$" | "PRICE_LEVEL_MODERATE" | "moderate" => Some(Self::Moderate),
            "$$$" | "PRICE_LEVEL_EXPENSIVE" | "expensive" => Some(Self::Upscale),
            "$$$$" | "PRICE_LEVEL_VERY_EXPENSIVE" | "very_expensive" => Some(Self::Luxury),
            _ => None,
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for PriceTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownPriceTier(s.to_string()))
    }
}

/// A price level as reported by one discovery source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PriceSignal {
    pub source: String,
    pub tier: PriceTier,
}

/// A discovered venue under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    /// At most one signal per source.
    #[serde(default)]
    pub price_signals: Vec<PriceSignal>,
    /// Sources that reported this venue, in discovery order.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: String::new(),
            coordinates,
            rating: None,
            category: None,
            price_signals: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn with_price(mut self, source: impl Into<String>, tier: PriceTier) -> Self {
        self.set_price(source, tier);
        self
    }

    /// Record a source's price, replacing any earlier signal from it.
    pub fn set_price(&mut self, source: impl Into<String>, tier: PriceTier) {
        let source = source.into();
        match self.price_signals.iter_mut().find(|s| s.source == source) {
            Some(existing) => existing.tier = tier,
            None => self.price_signals.push(PriceSignal { source, tier }),
        }
    }

    pub fn rating_or_zero(&self) -> f64 {
        self.rating.unwrap_or(0.0)
    }

    /// Lowercased, whitespace-collapsed name used for de-duplication.
    pub fn normalized_name(&self) -> String {
        self.name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}
