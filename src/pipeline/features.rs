//! Feature extraction: raw image bytes to color and texture ratios.
//!
//! Every image is reduced to the same square analysis grid before any pixel is
//! counted, so ratios do not depend on the input resolution and identical bytes
//! always produce identical features.
//!
//! Flow:
//! 1. Validate bytes (size bounds)
//! 2. Decode image
//! 3. `orientation.correct()` — fix EXIF rotation
//! 4. Convert to RGB, pre-downscale oversized inputs, resize to the grid
//! 5. Classify each pixel (green / discolored / dark / bright)
//! 6. Luminance + Laplacian edge density
//! 7. Derive the plant-structure flag

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::ImageFeatures;
use crate::pipeline_config::{ClassifierConfig, GridConfig, PixelThresholds, StructureThresholds};

/// Smallest byte buffer worth handing to the decoder (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Image data too small to be valid ({0} bytes)")]
    TooSmall(usize),

    #[error("Image data exceeds {max_mb}MB limit")]
    TooLarge { max_mb: usize },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

// ═══════════════════════════════════════════════════════════
// Service traits
// ═══════════════════════════════════════════════════════════

/// Turns image bytes into `ImageFeatures`. Never fails: undecodable input
/// yields all-zero features.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image_bytes: &[u8]) -> ImageFeatures;
}

/// Fixes image orientation from EXIF metadata.
///
/// Phone photos embed rotation in EXIF tag 0x0112. Without correction a
/// portrait leaf shot is resized into the grid sideways.
pub trait OrientationCorrector: Send + Sync {
    /// `raw_bytes`: original file bytes (needed for EXIF reading).
    /// No-op if no EXIF or orientation=1.
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage;
}

// ═══════════════════════════════════════════════════════════
// PixelFeatureExtractor
// ═══════════════════════════════════════════════════════════

/// Production extractor: fixed grid, per-pixel color rules, Laplacian edges.
pub struct PixelFeatureExtractor {
    orientation: Box<dyn OrientationCorrector>,
    grid: GridConfig,
    pixel: PixelThresholds,
    structure: StructureThresholds,
}

impl PixelFeatureExtractor {
    pub fn new(
        orientation: Box<dyn OrientationCorrector>,
        grid: GridConfig,
        pixel: PixelThresholds,
        structure: StructureThresholds,
    ) -> Self {
        Self {
            orientation,
            grid,
            pixel,
            structure,
        }
    }

    /// EXIF-aware extractor using the thresholds from `config`.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            Box::new(ExifOrientationCorrector),
            config.grid.clone(),
            config.pixel.clone(),
            config.structure.clone(),
        )
    }

    /// Fallible core of `extract`.
    pub fn try_extract(&self, image_bytes: &[u8]) -> Result<ImageFeatures, FeatureError> {
        let grid = decode_to_grid(image_bytes, self.orientation.as_ref(), &self.grid)?;
        let colors = color_ratios(&grid, &self.pixel);
        let gray = rgb_to_gray(&grid);
        let edge_ratio = edge_ratio(&gray, self.pixel.edge_magnitude);

        let mut features = ImageFeatures {
            green_ratio: colors.green,
            discolor_ratio: colors.discolor,
            dark_ratio: colors.dark,
            bright_ratio: colors.bright,
            edge_ratio,
            has_plant_structure: false,
        };
        features.has_plant_structure = plant_structure(&features, &self.structure);
        Ok(features)
    }
}

impl Default for PixelFeatureExtractor {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl FeatureExtractor for PixelFeatureExtractor {
    fn extract(&self, image_bytes: &[u8]) -> ImageFeatures {
        match self.try_extract(image_bytes) {
            Ok(features) => {
                debug!(
                    green = features.green_ratio,
                    discolor = features.discolor_ratio,
                    dark = features.dark_ratio,
                    bright = features.bright_ratio,
                    edge = features.edge_ratio,
                    plant_structure = features.has_plant_structure,
                    "Image features extracted"
                );
                features
            }
            Err(e) => {
                warn!(error = %e, bytes = image_bytes.len(), "Image analysis failed, using empty features");
                ImageFeatures::default()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// EXIF-based orientation correction for phone photos.
///
/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub struct ExifOrientationCorrector;

impl OrientationCorrector for ExifOrientationCorrector {
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        let orientation = read_exif_orientation(raw_bytes);
        apply_orientation(image, orientation)
    }
}

/// Returns image unchanged. For inputs that carry no camera metadata.
pub struct NoOpOrientationCorrector;

impl OrientationCorrector for NoOpOrientationCorrector {
    fn correct(&self, _raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        image
    }
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════

pub fn validate_image_bytes(bytes: &[u8], max_bytes: usize) -> Result<(), FeatureError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(FeatureError::TooSmall(bytes.len()));
    }
    if bytes.len() > max_bytes {
        return Err(FeatureError::TooLarge {
            max_mb: max_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

/// Decode, orient and resize to a `grid.size` square RGB grid.
///
/// The resize does not preserve aspect ratio: every pixel of the photo lands
/// somewhere in the grid. Inputs already at grid size are not resampled.
pub fn decode_to_grid(
    bytes: &[u8],
    orientation: &dyn OrientationCorrector,
    grid: &GridConfig,
) -> Result<RgbImage, FeatureError> {
    validate_image_bytes(bytes, grid.max_image_bytes)?;

    let img = image::load_from_memory(bytes)?;
    let (orig_w, orig_h) = img.dimensions();
    let rgb = orientation.correct(bytes, img).to_rgb8();

    let size = grid.size.max(1);
    if rgb.width() == size && rgb.height() == size {
        return Ok(rgb);
    }

    let working = pre_downscale(&rgb, grid.max_input_dimension);
    let resized = image::imageops::resize(&*working, size, size, FilterType::CatmullRom);

    debug!(
        original = format!("{orig_w}x{orig_h}"),
        grid = format!("{size}x{size}"),
        "Image resized to analysis grid"
    );

    Ok(resized)
}

/// Pre-downscale oversized images to reduce memory before the main resize.
fn pre_downscale(img: &RgbImage, max_dim: u32) -> Cow<'_, RgbImage> {
    let (w, h) = (img.width(), img.height());
    let largest = w.max(h);

    if largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Pre-downscaling oversized image"
    );

    Cow::Owned(image::imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

// ═══════════════════════════════════════════════════════════
// Color analysis
// ═══════════════════════════════════════════════════════════

/// Mutually exclusive pixel classes. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
    /// Healthy vegetation.
    Green,
    /// Yellowing, browning, rust.
    Discolored,
    Dark,
    Bright,
}

/// Classify one pixel; `None` for pixels matching no class (greys, blues, ...).
pub fn classify_pixel(pixel: &Rgb<u8>, t: &PixelThresholds) -> Option<PixelClass> {
    let [r, g, b] = pixel.0;
    let (r, g, b) = (r as i32, g as i32, b as i32);

    let green_margin = t.green_margin as i32;
    if g > r + green_margin && g > b + green_margin && g > t.green_min as i32 {
        return Some(PixelClass::Green);
    }

    let discolor_margin = t.discolor_margin as i32;
    let reddish = r > g + discolor_margin && r > b + discolor_margin && r > t.discolor_red_min as i32;
    let brownish = r > t.brown_red_min as i32
        && g > t.brown_green_min as i32
        && b < t.brown_blue_max as i32
        && r > g;
    if reddish || brownish {
        return Some(PixelClass::Discolored);
    }

    let dark = t.dark_max as i32;
    if r < dark && g < dark && b < dark {
        return Some(PixelClass::Dark);
    }

    let bright = t.bright_min as i32;
    if r > bright && g > bright && b > bright {
        return Some(PixelClass::Bright);
    }

    None
}

/// Fractions of grid pixels per class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorRatios {
    pub green: f32,
    pub discolor: f32,
    pub dark: f32,
    pub bright: f32,
}

pub fn color_ratios(image: &RgbImage, thresholds: &PixelThresholds) -> ColorRatios {
    let pixel_count = (image.width() as usize) * (image.height() as usize);
    if pixel_count == 0 {
        return ColorRatios::default();
    }

    let mut counts = [0usize; 4];
    for pixel in image.pixels() {
        match classify_pixel(pixel, thresholds) {
            Some(PixelClass::Green) => counts[0] += 1,
            Some(PixelClass::Discolored) => counts[1] += 1,
            Some(PixelClass::Dark) => counts[2] += 1,
            Some(PixelClass::Bright) => counts[3] += 1,
            None => {}
        }
    }

    let total = pixel_count as f32;
    ColorRatios {
        green: counts[0] as f32 / total,
        discolor: counts[1] as f32 / total,
        dark: counts[2] as f32 / total,
        bright: counts[3] as f32 / total,
    }
}

// ═══════════════════════════════════════════════════════════
// Texture analysis
// ═══════════════════════════════════════════════════════════

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32) as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// 8-neighbour Laplacian response at `(x, y)`: `[-1,-1,-1; -1,8,-1; -1,-1,-1]`.
///
/// Out-of-bounds neighbours replicate the nearest border pixel, so a uniform
/// image has zero response everywhere, borders included.
pub fn laplacian_response(img: &GrayImage, x: u32, y: u32) -> i32 {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let center = img.get_pixel(x, y).0[0] as i32;

    let mut neighbours = 0i32;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = (x as i64 + dx).clamp(0, w - 1) as u32;
            let ny = (y as i64 + dy).clamp(0, h - 1) as u32;
            neighbours += img.get_pixel(nx, ny).0[0] as i32;
        }
    }

    8 * center - neighbours
}

/// Fraction of pixels whose clipped absolute Laplacian response exceeds `threshold`.
pub fn edge_ratio(img: &GrayImage, threshold: u8) -> f32 {
    let (w, h) = (img.width(), img.height());
    let pixel_count = (w as usize) * (h as usize);
    if pixel_count == 0 {
        return 0.0;
    }

    let mut edges = 0usize;
    for y in 0..h {
        for x in 0..w {
            let magnitude = laplacian_response(img, x, y).unsigned_abs().min(255);
            if magnitude > threshold as u32 {
                edges += 1;
            }
        }
    }

    edges as f32 / pixel_count as f32
}

// ═══════════════════════════════════════════════════════════
// Plant structure
// ═══════════════════════════════════════════════════════════

/// Plant-like composition: strong green with some texture, dominant green, or
/// moderate green with heavy texture and little shadow. Near-uniform white or
/// black frames are vetoed regardless.
pub fn plant_structure(features: &ImageFeatures, t: &StructureThresholds) -> bool {
    let green = features.green_ratio;
    let edge = features.edge_ratio;

    let plant_like = (green > t.strong_green && edge > t.strong_green_edge)
        || green > t.dominant_green
        || (green > t.textured_green && edge > t.textured_edge && features.dark_ratio < t.textured_dark_max);

    let vetoed = features.bright_ratio > t.bright_veto || features.dark_ratio > t.dark_veto;

    plant_like && !vetoed
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
