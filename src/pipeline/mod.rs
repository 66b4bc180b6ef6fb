pub mod types;
pub mod features; // Pixel grid → color/texture ratios
pub mod detection; // Plant vs non-plant gate
pub mod health; // Healthy vs diseased + severity
pub mod catalog; // Fingerprint → catalog identifier
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_images;

pub use types::*;
pub use features::{FeatureError, FeatureExtractor, PixelFeatureExtractor};
pub use detection::{PlantDetector, PlantVerdict};
pub use health::HealthClassifier;
pub use catalog::*;
pub use orchestrator::*;
