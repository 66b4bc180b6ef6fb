//! Classifier configuration: every threshold the pipeline reads.
//!
//! The defaults are the production-tuned values. Each group deserializes with
//! `#[serde(default)]`, so a JSON override only needs the keys it changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════

pub mod defaults {
    /// Side of the square analysis grid (pixels).
    pub const GRID_SIZE: u32 = 150;
    /// Inputs larger than this are pre-downscaled before the grid resize.
    pub const MAX_INPUT_DIMENSION: u32 = 4096;
    /// Byte buffers above this size are rejected before decoding.
    pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

    pub const GREEN_MARGIN: u8 = 20;
    pub const GREEN_MIN: u8 = 70;
    pub const DISCOLOR_MARGIN: u8 = 20;
    pub const DISCOLOR_RED_MIN: u8 = 90;
    pub const BROWN_RED_MIN: u8 = 110;
    pub const BROWN_GREEN_MIN: u8 = 90;
    pub const BROWN_BLUE_MAX: u8 = 100;
    pub const DARK_MAX: u8 = 50;
    pub const BRIGHT_MIN: u8 = 200;
    pub const EDGE_MAGNITUDE: u8 = 25;

    pub const STRONG_GREEN: f32 = 0.15;
    pub const STRONG_GREEN_EDGE: f32 = 0.05;
    pub const DOMINANT_GREEN: f32 = 0.25;
    pub const TEXTURED_GREEN: f32 = 0.10;
    pub const TEXTURED_EDGE: f32 = 0.08;
    pub const TEXTURED_DARK_MAX: f32 = 0.40;
    pub const BRIGHT_VETO: f32 = 0.60;
    pub const DARK_VETO: f32 = 0.70;

    pub const DISCOLOR_HIGH: f32 = 0.12;
    pub const DISCOLOR_MEDIUM: f32 = 0.07;
    pub const DISCOLOR_LOW: f32 = 0.04;
    pub const LOW_GREEN_WITH_DISCOLOR: f32 = 0.20;
    pub const PALE_GREEN: f32 = 0.15;
    pub const LOW_TEXTURE: f32 = 0.03;

    pub const NON_PLANT: f32 = 0.95;
    pub const HEALTHY_BASE: f32 = 0.65;
    pub const HEALTHY_GREEN_WEIGHT: f32 = 1.2;
    pub const HEALTHY_CAP: f32 = 0.92;
    pub const DISEASED_BASE: f32 = 0.60;
    pub const DISEASED_DISCOLOR_WEIGHT: f32 = 4.0;
    pub const DISEASED_EDGE_WEIGHT: f32 = 0.8;
    pub const DISEASED_EVIDENCE_CAP: f32 = 0.35;
    pub const HIGH_SEVERITY_BONUS: f32 = 0.10;
    pub const HIGH_SEVERITY_CAP: f32 = 0.92;
    pub const DISEASED_FLOOR: f32 = 0.55;
    pub const DISEASED_CEILING: f32 = 0.94;
    pub const NO_MATCH: f32 = 0.65;
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Analysis grid geometry and decode limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub size: u32,
    pub max_input_dimension: u32,
    pub max_image_bytes: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: defaults::GRID_SIZE,
            max_input_dimension: defaults::MAX_INPUT_DIMENSION,
            max_image_bytes: defaults::MAX_IMAGE_BYTES,
        }
    }
}

/// Per-pixel channel thresholds (0-255).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelThresholds {
    /// Green must exceed red and blue by this much.
    pub green_margin: u8,
    pub green_min: u8,
    /// Red must exceed green and blue by this much (rust/necrosis tones).
    pub discolor_margin: u8,
    pub discolor_red_min: u8,
    /// Secondary brown/yellow rule.
    pub brown_red_min: u8,
    pub brown_green_min: u8,
    pub brown_blue_max: u8,
    /// All channels strictly below this = dark.
    pub dark_max: u8,
    /// All channels strictly above this = bright.
    pub bright_min: u8,
    /// Absolute Laplacian response above this = edge pixel.
    pub edge_magnitude: u8,
}

impl Default for PixelThresholds {
    fn default() -> Self {
        Self {
            green_margin: defaults::GREEN_MARGIN,
            green_min: defaults::GREEN_MIN,
            discolor_margin: defaults::DISCOLOR_MARGIN,
            discolor_red_min: defaults::DISCOLOR_RED_MIN,
            brown_red_min: defaults::BROWN_RED_MIN,
            brown_green_min: defaults::BROWN_GREEN_MIN,
            brown_blue_max: defaults::BROWN_BLUE_MAX,
            dark_max: defaults::DARK_MAX,
            bright_min: defaults::BRIGHT_MIN,
            edge_magnitude: defaults::EDGE_MAGNITUDE,
        }
    }
}

/// Ratio thresholds for the plant-structure flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureThresholds {
    pub strong_green: f32,
    pub strong_green_edge: f32,
    pub dominant_green: f32,
    pub textured_green: f32,
    pub textured_edge: f32,
    pub textured_dark_max: f32,
    /// Near-white frames are never plants.
    pub bright_veto: f32,
    /// Near-black frames are never plants.
    pub dark_veto: f32,
}

impl Default for StructureThresholds {
    fn default() -> Self {
        Self {
            strong_green: defaults::STRONG_GREEN,
            strong_green_edge: defaults::STRONG_GREEN_EDGE,
            dominant_green: defaults::DOMINANT_GREEN,
            textured_green: defaults::TEXTURED_GREEN,
            textured_edge: defaults::TEXTURED_EDGE,
            textured_dark_max: defaults::TEXTURED_DARK_MAX,
            bright_veto: defaults::BRIGHT_VETO,
            dark_veto: defaults::DARK_VETO,
        }
    }
}

/// Ratio thresholds for the health decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub discolor_high: f32,
    pub discolor_medium: f32,
    pub discolor_low: f32,
    /// Low discoloration only counts when green coverage is below this.
    pub low_green_with_discolor: f32,
    /// Pale canopy: green below this with texture below `low_texture`.
    pub pale_green: f32,
    pub low_texture: f32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            discolor_high: defaults::DISCOLOR_HIGH,
            discolor_medium: defaults::DISCOLOR_MEDIUM,
            discolor_low: defaults::DISCOLOR_LOW,
            low_green_with_discolor: defaults::LOW_GREEN_WITH_DISCOLOR,
            pale_green: defaults::PALE_GREEN,
            low_texture: defaults::LOW_TEXTURE,
        }
    }
}

/// Confidence model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceModel {
    pub non_plant: f32,
    pub healthy_base: f32,
    pub healthy_green_weight: f32,
    pub healthy_cap: f32,
    pub diseased_base: f32,
    pub diseased_discolor_weight: f32,
    pub diseased_edge_weight: f32,
    pub diseased_evidence_cap: f32,
    pub high_severity_bonus: f32,
    pub high_severity_cap: f32,
    pub diseased_floor: f32,
    pub diseased_ceiling: f32,
    /// Diseased, but the catalog had nothing to resolve against.
    pub no_match: f32,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            non_plant: defaults::NON_PLANT,
            healthy_base: defaults::HEALTHY_BASE,
            healthy_green_weight: defaults::HEALTHY_GREEN_WEIGHT,
            healthy_cap: defaults::HEALTHY_CAP,
            diseased_base: defaults::DISEASED_BASE,
            diseased_discolor_weight: defaults::DISEASED_DISCOLOR_WEIGHT,
            diseased_edge_weight: defaults::DISEASED_EDGE_WEIGHT,
            diseased_evidence_cap: defaults::DISEASED_EVIDENCE_CAP,
            high_severity_bonus: defaults::HIGH_SEVERITY_BONUS,
            high_severity_cap: defaults::HIGH_SEVERITY_CAP,
            diseased_floor: defaults::DISEASED_FLOOR,
            diseased_ceiling: defaults::DISEASED_CEILING,
            no_match: defaults::NO_MATCH,
        }
    }
}

/// Complete threshold table for one pipeline instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub grid: GridConfig,
    pub pixel: PixelThresholds,
    pub structure: StructureThresholds,
    pub health: HealthThresholds,
    pub confidence: ConfidenceModel,
}

// ═══════════════════════════════════════════════════════════
// Loading + validation
// ═══════════════════════════════════════════════════════════

impl ClassifierConfig {
    /// Parse a (possibly partial) JSON override and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Reject tables the decision rules cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.size < 3 {
            return Err(ConfigError::Invalid(format!(
                "grid.size must be at least 3, got {}",
                self.grid.size
            )));
        }
        if self.grid.max_input_dimension < self.grid.size {
            return Err(ConfigError::Invalid(
                "grid.max_input_dimension must not be smaller than grid.size".into(),
            ));
        }

        let ratios = [
            ("structure.strong_green", self.structure.strong_green),
            ("structure.strong_green_edge", self.structure.strong_green_edge),
            ("structure.dominant_green", self.structure.dominant_green),
            ("structure.textured_green", self.structure.textured_green),
            ("structure.textured_edge", self.structure.textured_edge),
            ("structure.textured_dark_max", self.structure.textured_dark_max),
            ("structure.bright_veto", self.structure.bright_veto),
            ("structure.dark_veto", self.structure.dark_veto),
            ("health.discolor_high", self.health.discolor_high),
            ("health.discolor_medium", self.health.discolor_medium),
            ("health.discolor_low", self.health.discolor_low),
            ("health.low_green_with_discolor", self.health.low_green_with_discolor),
            ("health.pale_green", self.health.pale_green),
            ("health.low_texture", self.health.low_texture),
            ("confidence.non_plant", self.confidence.non_plant),
            ("confidence.healthy_cap", self.confidence.healthy_cap),
            ("confidence.high_severity_cap", self.confidence.high_severity_cap),
            ("confidence.diseased_floor", self.confidence.diseased_floor),
            ("confidence.diseased_ceiling", self.confidence.diseased_ceiling),
            ("confidence.no_match", self.confidence.no_match),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        let h = &self.health;
        if !(h.discolor_low <= h.discolor_medium && h.discolor_medium <= h.discolor_high) {
            return Err(ConfigError::Invalid(
                "health discoloration thresholds must satisfy low <= medium <= high".into(),
            ));
        }

        let c = &self.confidence;
        if c.diseased_floor > c.diseased_ceiling {
            return Err(ConfigError::Invalid(
                "confidence.diseased_floor exceeds confidence.diseased_ceiling".into(),
            ));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
