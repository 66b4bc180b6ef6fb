//! Plant gate: decides whether the health rules run at all.

use super::types::ImageFeatures;
use crate::pipeline_config::ConfidenceModel;

/// Plant vs non-plant verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlantVerdict {
    Plant,
    /// Not a plant, with the fixed confidence of the conservative veto.
    NonPlant { confidence: f32 },
}

/// Gatekeeper in front of the health rules.
///
/// The structure flag already encodes the green/texture rules and the
/// white/black veto; the detector only attaches the non-plant confidence.
#[derive(Debug, Clone)]
pub struct PlantDetector {
    non_plant_confidence: f32,
}

impl PlantDetector {
    pub fn new(confidence: &ConfidenceModel) -> Self {
        Self {
            non_plant_confidence: confidence.non_plant,
        }
    }

    pub fn detect(&self, features: &ImageFeatures) -> PlantVerdict {
        if features.has_plant_structure {
            PlantVerdict::Plant
        } else {
            PlantVerdict::NonPlant {
                confidence: self.non_plant_confidence,
            }
        }
    }
}

impl Default for PlantDetector {
    fn default() -> Self {
        Self::new(&ConfidenceModel::default())
    }
}
