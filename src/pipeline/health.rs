//! Health rules for images already accepted as plants.
//!
//! Discoloration is the primary signal, green coverage the secondary one, and
//! texture only matters for pale canopies. Confidence values are deliberately
//! kept inside a band: these are heuristics, never certainty.

use super::types::{HealthAssessment, ImageFeatures, Severity};
use crate::pipeline_config::{ConfidenceModel, HealthThresholds};

#[derive(Debug, Clone, Default)]
pub struct HealthClassifier {
    thresholds: HealthThresholds,
    confidence: ConfidenceModel,
}

impl HealthClassifier {
    pub fn new(thresholds: HealthThresholds, confidence: ConfidenceModel) -> Self {
        Self {
            thresholds,
            confidence,
        }
    }

    /// First matching rule wins.
    pub fn assess(&self, features: &ImageFeatures) -> HealthAssessment {
        let t = &self.thresholds;
        let discolor = features.discolor_ratio;
        let green = features.green_ratio;

        if discolor > t.discolor_high {
            HealthAssessment::Diseased(Severity::High)
        } else if discolor > t.discolor_medium {
            HealthAssessment::Diseased(Severity::Medium)
        } else if discolor > t.discolor_low && green < t.low_green_with_discolor {
            HealthAssessment::Diseased(Severity::Low)
        } else if green < t.pale_green && features.edge_ratio < t.low_texture {
            // textureless, pale canopy
            HealthAssessment::Diseased(Severity::Medium)
        } else {
            HealthAssessment::Healthy
        }
    }

    /// Grows with green coverage, capped below certainty.
    pub fn healthy_confidence(&self, features: &ImageFeatures) -> f32 {
        let c = &self.confidence;
        (c.healthy_base + features.green_ratio * c.healthy_green_weight)
            .min(c.healthy_cap)
            .clamp(0.0, 1.0)
    }

    /// Grows with discoloration, then texture; high severity earns a bonus.
    pub fn diseased_confidence(&self, features: &ImageFeatures, severity: Severity) -> f32 {
        let c = &self.confidence;
        let evidence = features.discolor_ratio * c.diseased_discolor_weight
            + features.edge_ratio * c.diseased_edge_weight;
        let mut confidence = c.diseased_base + evidence.min(c.diseased_evidence_cap);

        if severity == Severity::High {
            confidence = (confidence + c.high_severity_bonus).min(c.high_severity_cap);
        }

        // tolerates floor > ceiling from an unvalidated config
        confidence
            .max(c.diseased_floor)
            .min(c.diseased_ceiling)
            .clamp(0.0, 1.0)
    }

    /// Fixed confidence when symptoms are present but the catalog is empty.
    pub fn no_match_confidence(&self) -> f32 {
        self.confidence.no_match
    }
}
