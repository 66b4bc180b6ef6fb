//! Value types shared across the classification stages.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque key of one disease record in the external catalog.
///
/// Serialized as a string; deserializes from a string or an integer key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CatalogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(n) => Self(n.to_string()),
        })
    }
}

impl From<&str> for CatalogId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CatalogId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for CatalogId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Color and texture ratios measured over the analysis grid.
///
/// All ratios are in [0, 1]. An undecodable image yields `ImageFeatures::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageFeatures {
    pub green_ratio: f32,
    pub discolor_ratio: f32,
    pub dark_ratio: f32,
    pub bright_ratio: f32,
    pub edge_ratio: f32,
    pub has_plant_structure: bool,
}

/// Top-level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    #[serde(rename = "non-plant")]
    NonPlant,
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "diseased")]
    Diseased,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonPlant => "non-plant",
            Self::Healthy => "healthy",
            Self::Diseased => "diseased",
        }
    }
}

/// Symptom grade, assigned only to diseased plants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the health rules for a plant image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAssessment {
    Healthy,
    Diseased(Severity),
}

/// Feature ratios rounded to four decimals for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRatios {
    pub green_ratio: f32,
    pub discolor_ratio: f32,
    pub edge_ratio: f32,
    pub dark_ratio: f32,
    pub bright_ratio: f32,
}

impl From<&ImageFeatures> for FeatureRatios {
    fn from(f: &ImageFeatures) -> Self {
        Self {
            green_ratio: round_to(f.green_ratio, 4),
            discolor_ratio: round_to(f.discolor_ratio, 4),
            edge_ratio: round_to(f.edge_ratio, 4),
            dark_ratio: round_to(f.dark_ratio, 4),
            bright_ratio: round_to(f.bright_ratio, 4),
        }
    }
}

/// The pipeline's sole output. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub is_plant: bool,
    /// `None` when the image is not a plant.
    pub is_healthy: Option<bool>,
    pub disease_id: Option<CatalogId>,
    pub confidence: f32,
    pub label: Label,
    pub severity: Option<Severity>,
    pub summary: String,
    #[serde(flatten)]
    pub ratios: FeatureRatios,
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f64.powi(decimals);
    ((value as f64 * factor).round() / factor) as f32
}
