//! Core types shared by mask extraction and synthesis

use crate::error::{Result, SmileDesignError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// A facial keypoint in normalized image coordinates
///
/// Both axes are expressed relative to the image size, so `(0.5, 0.5)` is the
/// frame center regardless of resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
}

impl NormalizedLandmark {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Map into integer pixel coordinates of a `width` x `height` frame
    #[must_use]
    pub fn to_pixel(self, width: u32, height: u32) -> (i32, i32) {
        let x = (f64::from(self.x) * f64::from(width)).round() as i32;
        let y = (f64::from(self.y) * f64::from(height)).round() as i32;
        (x, y)
    }
}

/// Landmarks for exactly one face, in detector order
///
/// An empty set means detection failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<NormalizedLandmark>,
}

impl LandmarkSet {
    #[must_use]
    pub fn new(points: Vec<NormalizedLandmark>) -> Self {
        Self { points }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<NormalizedLandmark> {
        self.points.get(index).copied()
    }

    #[must_use]
    pub fn points(&self) -> &[NormalizedLandmark] {
        &self.points
    }
}

impl From<Vec<NormalizedLandmark>> for LandmarkSet {
    fn from(points: Vec<NormalizedLandmark>) -> Self {
        Self::new(points)
    }
}

/// Face-mesh indices of the inner lip contour: upper lip left to right,
/// then lower lip right to left so the walk closes on itself.
const INNER_LIPS_V1: [usize; 20] = [
    78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308, // upper inner
    324, 318, 402, 317, 14, 87, 178, 88, 95, // lower inner
];

/// Ordered landmark indices forming the closed contour of the editable region
///
/// The index list is a versioned contract: changing or reordering it changes
/// which facial region is masked, so any edit must bump `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPolygon {
    pub name: String,
    pub version: u32,
    pub indices: Vec<usize>,
}

impl RegionPolygon {
    /// Inner-lip contour of the 468/478-point face mesh (the visible mouth opening)
    #[must_use]
    pub fn inner_lips() -> Self {
        Self {
            name: "inner_lips".to_string(),
            version: 1,
            indices: INNER_LIPS_V1.to_vec(),
        }
    }

    /// Number of vertices in the contour
    #[must_use]
    pub fn arity(&self) -> usize {
        self.indices.len()
    }

    /// Check the polygon can describe an area
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() < 3 {
            return Err(SmileDesignError::invalid_config(format!(
                "Region polygon '{}' v{} needs at least 3 indices, has {}",
                self.name,
                self.version,
                self.indices.len()
            )));
        }
        Ok(())
    }

    /// Resolve the contour against a landmark set into pixel coordinates
    ///
    /// Points are clamped into the frame.
    pub fn to_pixels(&self, landmarks: &LandmarkSet, width: u32, height: u32) -> Result<Vec<(i32, i32)>> {
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;

        self.indices
            .iter()
            .map(|&index| {
                let landmark = landmarks.get(index).ok_or_else(|| {
                    SmileDesignError::invalid_input(format!(
                        "Landmark index {} of region '{}' is outside the landmark set ({} points)",
                        index,
                        self.name,
                        landmarks.len()
                    ))
                })?;
                let (x, y) = landmark.to_pixel(width, height);
                Ok((x.clamp(0, max_x), y.clamp(0, max_y)))
            })
            .collect()
    }
}

impl Default for RegionPolygon {
    fn default() -> Self {
        Self::inner_lips()
    }
}

/// Soft-edged edit-permission map
///
/// 0 keeps the source pixel, 255 allows full replacement, values in between
/// are blend weights along the blurred boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// Maximum intensity, meaning fully replaceable
    pub const MAX: u8 = u8::MAX;

    #[must_use]
    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    /// Mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::from_image(GrayImage::from_pixel(width, height, Luma([value])))
    }

    /// Decode a mask from encoded image bytes, converting to single channel
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from_image(decoded.to_luma8()))
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Intensity at `(x, y)`, `None` outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        self.image.get_pixel_checked(x, y).map(|p| p[0])
    }

    #[must_use]
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let raw = self.image.as_raw();
        let total_pixels = raw.len();
        let editable_pixels = raw.iter().filter(|&&v| v > 0).count();
        let full_pixels = raw.iter().filter(|&&v| v == Self::MAX).count();
        let sum: u64 = raw.iter().map(|&v| u64::from(v)).sum();

        MaskStatistics {
            total_pixels,
            editable_pixels,
            full_pixels,
            min: raw.iter().copied().min().unwrap_or(0),
            max: raw.iter().copied().max().unwrap_or(0),
            mean: if total_pixels == 0 {
                0.0
            } else {
                sum as f32 / total_pixels as f32
            },
        }
    }

    /// Encode as PNG bytes
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Save mask as PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Statistics about a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    /// Pixels with any edit permission
    pub editable_pixels: usize,
    /// Pixels at maximum intensity
    pub full_pixels: usize,
    pub min: u8,
    pub max: u8,
    pub mean: f32,
}

/// Output of a remote capability: inline bytes or a resolvable location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Encoded image bytes (PNG, JPEG, ...)
    Bytes(Vec<u8>),
    /// `http(s)://` location or `data:` URL
    Reference(String),
}

impl ImagePayload {
    /// Encode a decoded image as inline PNG bytes
    pub fn png(image: &DynamicImage) -> Result<Self> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(Self::Bytes(buffer))
    }

    /// True when the payload carries nothing usable
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Reference(location) => location.trim().is_empty(),
        }
    }

    /// The external location, if this payload is a non-inline reference
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Reference(location) if !location.starts_with("data:") => Some(location),
            _ => None,
        }
    }

    /// Render as something a remote API accepts as an image input
    ///
    /// References pass through untouched, bytes become a `data:` URL.
    #[must_use]
    pub fn to_input_uri(&self) -> String {
        match self {
            Self::Reference(location) => location.clone(),
            Self::Bytes(bytes) => {
                let mime = image::guess_format(bytes)
                    .map(|format| format.to_mime_type())
                    .unwrap_or("image/png");
                format!("data:{};base64,{}", mime, BASE64.encode(bytes))
            },
        }
    }
}

/// Wall-clock time spent in each synthesis stage, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub edit_ms: u64,
    pub restore_ms: Option<u64>,
    pub normalize_ms: u64,
    pub composite_ms: Option<u64>,
}

impl StageTimings {
    #[must_use]
    pub fn total_ms(&self) -> u64 {
        self.edit_ms
            + self.restore_ms.unwrap_or(0)
            + self.normalize_ms
            + self.composite_ms.unwrap_or(0)
    }
}

/// Final image of one generation request
///
/// Built once by the orchestrator and never mutated; persistence is the caller's job.
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    /// Final image at the original resolution
    pub image: DynamicImage,
    /// Whether the masked blend onto the original was applied
    pub composited: bool,
    /// Whether the restoration stage contributed to the result
    pub restored: bool,
    /// Remote calls issued for the edit stage, retries included
    pub edit_attempts: u32,
    /// External location of the last remote result, when one was returned
    pub source_reference: Option<String>,
    pub timings: StageTimings,
}

impl SynthesisOutput {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Encode the final image as PNG bytes
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Encode the final image as a `data:image/png;base64,...` URL
    pub fn to_data_url(&self) -> Result<String> {
        Ok(format!(
            "data:image/png;base64,{}",
            BASE64.encode(self.to_png_bytes()?)
        ))
    }
}

/// The four values handed to the persistence collaborator per successful generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub owner_id: String,
    pub directive: String,
    /// Final image as a URL or `data:` URL
    pub image: String,
    pub created_at: DateTime<Utc>,
}
