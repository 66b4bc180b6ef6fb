//! Pipeline orchestrator: features, plant gate, health rules, catalog lookup.
//!
//! Every entry point returns a `ClassificationResult`. Decode failures, empty
//! catalogs and store errors all fold into a result record.

use std::path::Path;

use tracing::{debug, info, warn};

use super::catalog::{CatalogResolver, CatalogStore, Fingerprint, FingerprintSource};
use super::detection::{PlantDetector, PlantVerdict};
use super::features::{FeatureExtractor, PixelFeatureExtractor};
use super::health::HealthClassifier;
use super::types::{
    round_to, CatalogId, ClassificationResult, FeatureRatios, HealthAssessment, ImageFeatures,
    Label, Severity,
};
use crate::pipeline_config::ClassifierConfig;

const NON_PLANT_SUMMARY: &str =
    "Image does not appear to contain a plant. Please upload a clear photo of plant leaves or stems.";
const NO_MATCH_SUMMARY: &str = "Disease symptoms detected but no catalog match available.";

/// Plant photo classification: features → plant gate → health rules → catalog.
///
/// Stateless once built; share one instance across threads freely.
/// Every entry point returns a result record, never an error.
pub struct ClassificationPipeline {
    extractor: Box<dyn FeatureExtractor>,
    detector: PlantDetector,
    health: HealthClassifier,
    resolver: CatalogResolver,
}

impl ClassificationPipeline {
    pub fn new(
        extractor: Box<dyn FeatureExtractor>,
        detector: PlantDetector,
        health: HealthClassifier,
    ) -> Self {
        Self {
            extractor,
            detector,
            health,
            resolver: CatalogResolver,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            Box::new(PixelFeatureExtractor::from_config(config)),
            PlantDetector::new(&config.confidence),
            HealthClassifier::new(config.health.clone(), config.confidence.clone()),
        )
    }

    /// Classify image bytes, consulting `catalog` only when symptoms are found.
    ///
    /// A blank or whitespace `category` means no filter.
    pub fn classify(
        &self,
        image_bytes: &[u8],
        category: Option<&str>,
        catalog: &dyn CatalogStore,
    ) -> ClassificationResult {
        self.run(image_bytes, FingerprintSource::Bytes(image_bytes), || {
            fetch_ids(catalog, category)
        })
    }

    /// Classify against an identifier list the caller already fetched.
    pub fn classify_with_ids(&self, image_bytes: &[u8], ids: &[CatalogId]) -> ClassificationResult {
        self.run(image_bytes, FingerprintSource::Bytes(image_bytes), || ids.to_vec())
    }

    /// Classify an image file. An unreadable file classifies as a non-plant;
    /// its fingerprint falls back to the path string.
    pub fn classify_path(
        &self,
        path: &Path,
        category: Option<&str>,
        catalog: &dyn CatalogStore,
    ) -> ClassificationResult {
        match std::fs::read(path) {
            Ok(bytes) => self.classify(&bytes, category, catalog),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read image file");
                let token = path.to_string_lossy();
                self.run(&[], FingerprintSource::Token(&token), || {
                    fetch_ids(catalog, category)
                })
            }
        }
    }

    fn run<F>(
        &self,
        image_bytes: &[u8],
        source: FingerprintSource<'_>,
        fetch: F,
    ) -> ClassificationResult
    where
        F: FnOnce() -> Vec<CatalogId>,
    {
        // Step 1: Features
        let features = self.extractor.extract(image_bytes);

        // Step 2: Plant gate
        if let PlantVerdict::NonPlant { confidence } = self.detector.detect(&features) {
            info!(label = Label::NonPlant.as_str(), "Image classified");
            return non_plant_result(&features, confidence);
        }

        // Step 3: Health rules
        let severity = match self.health.assess(&features) {
            HealthAssessment::Healthy => {
                let confidence = self.health.healthy_confidence(&features);
                info!(label = Label::Healthy.as_str(), confidence, "Image classified");
                return healthy_result(&features, confidence);
            }
            HealthAssessment::Diseased(severity) => severity,
        };

        // Step 4: Catalog resolution
        let ids = fetch();
        let fingerprint = Fingerprint::compute(source);
        let resolved = self.resolver.resolve(&fingerprint, &ids).cloned();
        debug!(
            fingerprint = %fingerprint,
            candidates = ids.len(),
            resolved = resolved.as_ref().map(CatalogId::as_str),
            "Catalog resolution"
        );

        let result = match resolved {
            Some(disease_id) => {
                let confidence = self.health.diseased_confidence(&features, severity);
                diseased_result(&features, severity, disease_id, confidence)
            }
            None => {
                warn!("No catalog identifiers to map symptoms to");
                no_match_result(&features, severity, self.health.no_match_confidence())
            }
        };

        info!(
            label = result.label.as_str(),
            severity = severity.as_str(),
            confidence = result.confidence,
            "Image classified"
        );
        result
    }
}

impl Default for ClassificationPipeline {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

/// One store query per call; a failing store counts as an empty catalog.
fn fetch_ids(catalog: &dyn CatalogStore, category: Option<&str>) -> Vec<CatalogId> {
    let category = category.map(str::trim).filter(|c| !c.is_empty());
    let listed = match category {
        Some(c) => catalog.list_ids_by_category(c),
        None => catalog.list_ids(),
    };
    listed.unwrap_or_else(|e| {
        warn!(error = %e, category, "Catalog lookup failed");
        Vec::new()
    })
}

// ═══════════════════════════════════════════════════════════
// Result assembly
// ═══════════════════════════════════════════════════════════

fn percent(ratio: f32) -> f32 {
    ratio * 100.0
}

fn non_plant_result(features: &ImageFeatures, confidence: f32) -> ClassificationResult {
    ClassificationResult {
        is_plant: false,
        is_healthy: None,
        disease_id: None,
        confidence: round_to(confidence, 2),
        label: Label::NonPlant,
        severity: None,
        summary: NON_PLANT_SUMMARY.to_string(),
        ratios: FeatureRatios::from(features),
    }
}

fn healthy_result(features: &ImageFeatures, confidence: f32) -> ClassificationResult {
    ClassificationResult {
        is_plant: true,
        is_healthy: Some(true),
        disease_id: None,
        confidence: round_to(confidence, 2),
        label: Label::Healthy,
        severity: None,
        summary: format!(
            "Plant appears healthy with good coloration (green: {:.1}%, discoloration: {:.1}%)",
            percent(features.green_ratio),
            percent(features.discolor_ratio)
        ),
        ratios: FeatureRatios::from(features),
    }
}

fn diseased_result(
    features: &ImageFeatures,
    severity: Severity,
    disease_id: CatalogId,
    confidence: f32,
) -> ClassificationResult {
    ClassificationResult {
        is_plant: true,
        is_healthy: Some(false),
        disease_id: Some(disease_id),
        confidence: round_to(confidence, 2),
        label: Label::Diseased,
        severity: Some(severity),
        summary: format!(
            "Disease detected with {severity} severity. Symptoms: discoloration {:.1}%, \
             green coverage {:.1}%, texture changes evident.",
            percent(features.discolor_ratio),
            percent(features.green_ratio)
        ),
        ratios: FeatureRatios::from(features),
    }
}

fn no_match_result(features: &ImageFeatures, severity: Severity, confidence: f32) -> ClassificationResult {
    ClassificationResult {
        is_plant: true,
        is_healthy: Some(false),
        disease_id: None,
        confidence: round_to(confidence, 2),
        label: Label::Diseased,
        severity: Some(severity),
        summary: NO_MATCH_SUMMARY.to_string(),
        ratios: FeatureRatios::from(features),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::catalog::{CatalogEntry, CatalogError, InMemoryCatalog};
    use crate::pipeline::test_images::{bands, encode_png, left_right, solid};

    const LEAF_GREEN: [u8; 3] = [40, 180, 50];
    const MID_BROWN: [u8; 3] = [150, 100, 50];
    const YELLOW: [u8; 3] = [200, 185, 60];
    const GREY: [u8; 3] = [128, 128, 128];

    fn ten_ids() -> Vec<CatalogId> {
        (1..=10i64).map(CatalogId::from).collect()
    }

    /// 50% green, 20% brown/yellow, 30% neutral background.
    fn blighted_leaf() -> Vec<u8> {
        encode_png(&bands(150, 150, &[(LEAF_GREEN, 75), (YELLOW, 30), (GREY, 45)]))
    }

    fn healthy_leaf() -> Vec<u8> {
        encode_png(&solid(150, 150, LEAF_GREEN))
    }

    /// Store that counts queries and can be told to fail.
    struct CountingStore {
        inner: InMemoryCatalog,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new(inner: InMemoryCatalog) -> Self {
            Self { inner, calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { inner: InMemoryCatalog::default(), calls: AtomicUsize::new(0), fail: true }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CatalogStore for CountingStore {
        fn list_ids(&self) -> Result<Vec<CatalogId>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CatalogError::Unavailable("connection refused".into()));
            }
            self.inner.list_ids()
        }

        fn list_ids_by_category(&self, category: &str) -> Result<Vec<CatalogId>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CatalogError::Query("syntax error".into()));
            }
            self.inner.list_ids_by_category(category)
        }
    }

    // ── Scenarios ──

    #[test]
    fn uniform_green_is_healthy_plant() {
        let pipeline = ClassificationPipeline::default();
        let result = pipeline.classify_with_ids(&healthy_leaf(), &ten_ids());

        assert!(result.is_plant);
        assert_eq!(result.is_healthy, Some(true));
        assert_eq!(result.disease_id, None);
        assert_eq!(result.label, Label::Healthy);
        assert_eq!(result.severity, None);
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert!(result.summary.contains("green: 100.0%"));
    }

    #[test]
    fn uniform_brown_is_not_a_plant() {
        let pipeline = ClassificationPipeline::default();
        let result = pipeline.classify_with_ids(&encode_png(&solid(150, 150, MID_BROWN)), &ten_ids());

        assert!(!result.is_plant);
        assert_eq!(result.is_healthy, None);
        assert_eq!(result.disease_id, None);
        assert_eq!(result.label, Label::NonPlant);
        assert_eq!(result.ratios.discolor_ratio, 1.0);
    }

    #[test]
    fn green_leaf_with_blight_patch_is_high_severity() {
        let pipeline = ClassificationPipeline::default();
        let ids = ten_ids();
        let result = pipeline.classify_with_ids(&blighted_leaf(), &ids);

        assert!(result.is_plant);
        assert_eq!(result.is_healthy, Some(false));
        assert_eq!(result.label, Label::Diseased);
        assert_eq!(result.severity, Some(Severity::High));
        assert!((result.ratios.green_ratio - 0.5).abs() < 1e-4);
        assert!((result.ratios.discolor_ratio - 0.2).abs() < 1e-4);
        assert!(ids.contains(result.disease_id.as_ref().unwrap()));
        assert!((result.confidence - 0.92).abs() < 1e-6, "got {}", result.confidence);
        assert!(result.summary.starts_with("Disease detected with high severity."));
    }

    #[test]
    fn fifteen_percent_patch_is_still_high_severity() {
        // 23 of 150 rows discolored
        let bytes = encode_png(&bands(150, 150, &[(LEAF_GREEN, 75), (YELLOW, 23), (GREY, 52)]));
        let result = ClassificationPipeline::default().classify_with_ids(&bytes, &ten_ids());

        assert_eq!(result.label, Label::Diseased);
        assert_eq!(result.severity, Some(Severity::High));
        assert!((result.ratios.discolor_ratio - 0.1533).abs() < 1e-4);
        assert!(result.disease_id.is_some());
        assert!((result.confidence - 0.92).abs() < 1e-6, "got {}", result.confidence);
    }

    #[test]
    fn identical_bytes_resolve_to_identical_id() {
        let pipeline = ClassificationPipeline::default();
        let bytes = blighted_leaf();
        let ids = ten_ids();

        let first = pipeline.classify_with_ids(&bytes, &ids);
        let second = pipeline.classify_with_ids(&bytes.clone(), &ids);
        assert!(first.disease_id.is_some());
        assert_eq!(first.disease_id, second.disease_id);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_catalog_gives_unmatched_diseased_result() {
        let pipeline = ClassificationPipeline::default();
        let result = pipeline.classify_with_ids(&blighted_leaf(), &[]);

        assert!(result.is_plant);
        assert_eq!(result.is_healthy, Some(false));
        assert_eq!(result.disease_id, None);
        assert_eq!(result.label, Label::Diseased);
        assert_eq!(result.severity, Some(Severity::High));
        assert!((result.confidence - 0.65).abs() < 1e-6);
        assert_eq!(result.summary, NO_MATCH_SUMMARY);
    }

    // ── Catalog collaborator ──

    #[test]
    fn healthy_plant_never_queries_catalog() {
        let pipeline = ClassificationPipeline::default();
        let store = CountingStore::new(InMemoryCatalog::from_ids(ten_ids()));
        pipeline.classify(&healthy_leaf(), None, &store);
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn diseased_plant_queries_catalog_once() {
        let pipeline = ClassificationPipeline::default();
        let store = CountingStore::new(InMemoryCatalog::from_ids(ten_ids()));
        let result = pipeline.classify(&blighted_leaf(), None, &store);
        assert_eq!(store.calls(), 1);
        assert!(result.disease_id.is_some());
    }

    #[test]
    fn store_and_slice_paths_agree() {
        let pipeline = ClassificationPipeline::default();
        let store = InMemoryCatalog::from_ids(ten_ids());
        let via_store = pipeline.classify(&blighted_leaf(), None, &store);
        let via_slice = pipeline.classify_with_ids(&blighted_leaf(), &ten_ids());
        assert_eq!(via_store, via_slice);
    }

    #[test]
    fn category_filter_restricts_candidates() {
        let pipeline = ClassificationPipeline::default();
        let store = InMemoryCatalog::new(vec![
            CatalogEntry { id: "a".into(), category: Some("fungal".into()) },
            CatalogEntry { id: "b".into(), category: Some("viral".into()) },
            CatalogEntry { id: "c".into(), category: Some("fungal".into()) },
        ]);
        let result = pipeline.classify(&blighted_leaf(), Some("viral"), &store);
        assert_eq!(result.disease_id, Some(CatalogId::from("b")));
    }

    #[test]
    fn unknown_category_is_no_match() {
        let pipeline = ClassificationPipeline::default();
        let store = InMemoryCatalog::from_ids(ten_ids());
        let result = pipeline.classify(&blighted_leaf(), Some("nematode"), &store);
        assert_eq!(result.disease_id, None);
        assert_eq!(result.label, Label::Diseased);
    }

    #[test]
    fn blank_category_means_unfiltered() {
        let pipeline = ClassificationPipeline::default();
        let store = InMemoryCatalog::from_ids(ten_ids());
        let result = pipeline.classify(&blighted_leaf(), Some("  "), &store);
        assert!(result.disease_id.is_some());
    }

    #[test]
    fn failing_store_degrades_to_no_match() {
        let pipeline = ClassificationPipeline::default();
        let store = CountingStore::failing();
        let result = pipeline.classify(&blighted_leaf(), Some("fungal"), &store);
        assert_eq!(store.calls(), 1);
        assert_eq!(result.disease_id, None);
        assert_eq!(result.is_healthy, Some(false));
        assert_eq!(result.summary, NO_MATCH_SUMMARY);
    }

    // ── Fallbacks and invariants ──

    #[test]
    fn corrupt_bytes_are_non_plant() {
        let pipeline = ClassificationPipeline::default();
        let result = pipeline.classify_with_ids(b"definitely not an image, just some text bytes padding padding padding", &ten_ids());
        assert!(!result.is_plant);
        assert_eq!(result.label, Label::NonPlant);
        assert!((result.confidence - 0.95).abs() < 1e-6);
        assert_eq!(result.ratios, FeatureRatios::from(&ImageFeatures::default()));
    }

    #[test]
    fn inverted_confidence_band_still_classifies() {
        let mut config = ClassifierConfig::default();
        config.confidence.diseased_floor = 0.9;
        config.confidence.diseased_ceiling = 0.5;
        assert!(config.validate().is_err());

        let result = ClassificationPipeline::from_config(&config)
            .classify_with_ids(&blighted_leaf(), &[CatalogId::from("x")]);
        assert_eq!(result.label, Label::Diseased);
        assert_eq!(result.disease_id, Some(CatalogId::from("x")));
        assert!((result.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn white_and_black_frames_are_vetoed() {
        let pipeline = ClassificationPipeline::default();
        for color in [[255, 255, 255], [230, 235, 228], [0, 0, 0], [20, 25, 18]] {
            let result = pipeline.classify_with_ids(&encode_png(&solid(150, 150, color)), &ten_ids());
            assert!(!result.is_plant, "{color:?} should not be a plant");
        }
    }

    #[test]
    fn ratios_and_confidence_stay_in_unit_range() {
        let pipeline = ClassificationPipeline::default();
        let images = vec![
            healthy_leaf(),
            blighted_leaf(),
            encode_png(&left_right(200, 120, LEAF_GREEN, [255, 255, 255], 60)),
            encode_png(&bands(90, 300, &[(LEAF_GREEN, 40), ([10, 10, 10], 200), (MID_BROWN, 60)])),
            encode_png(&solid(3, 3, GREY)),
            Vec::new(),
        ];
        for bytes in images {
            let r = pipeline.classify_with_ids(&bytes, &ten_ids());
            for v in [
                r.confidence,
                r.ratios.green_ratio,
                r.ratios.discolor_ratio,
                r.ratios.edge_ratio,
                r.ratios.dark_ratio,
                r.ratios.bright_ratio,
            ] {
                assert!((0.0..=1.0).contains(&v), "{v} out of range");
            }
            assert_eq!(r.severity.is_some(), r.label == Label::Diseased);
            assert_eq!(r.is_healthy.is_none(), !r.is_plant);
        }
    }

    #[test]
    fn classify_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        std::fs::write(&path, blighted_leaf()).unwrap();

        let pipeline = ClassificationPipeline::default();
        let store = InMemoryCatalog::from_ids(ten_ids());
        let from_path = pipeline.classify_path(&path, None, &store);
        let from_bytes = pipeline.classify(&blighted_leaf(), None, &store);
        assert_eq!(from_path, from_bytes);
    }

    #[test]
    fn classify_missing_path_is_non_plant() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ClassificationPipeline::default();
        let store = CountingStore::new(InMemoryCatalog::from_ids(ten_ids()));
        let result = pipeline.classify_path(&dir.path().join("missing.jpg"), None, &store);
        assert!(!result.is_plant);
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn pipeline_is_shareable_across_threads() {
        let pipeline = Arc::new(ClassificationPipeline::default());
        let bytes = Arc::new(blighted_leaf());
        let expected = pipeline.classify_with_ids(&bytes, &ten_ids());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                let bytes = Arc::clone(&bytes);
                std::thread::spawn(move || pipeline.classify_with_ids(&bytes, &ten_ids()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn result_serializes_for_transport() {
        let pipeline = ClassificationPipeline::default();
        let result = pipeline.classify_with_ids(&blighted_leaf(), &ten_ids());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["label"], "diseased");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["is_plant"], true);
        assert!(json["disease_id"].is_string());
        assert!(json.get("green_ratio").is_some());
    }
}
