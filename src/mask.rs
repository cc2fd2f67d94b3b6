//! Landmark-driven mask extraction
//!
//! A mask is produced in three deterministic steps: the region contour is
//! filled at full intensity, grown by a square dilation, and softened with a
//! Gaussian blur whose width is derived from the configured kernel side.

use crate::{
    config::MaskConfig,
    error::{Result, SmileDesignError},
    landmarks::LandmarkDetector,
    types::{LandmarkSet, Mask},
};
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    distance_transform::Norm,
    drawing::{draw_line_segment_mut, draw_polygon_mut},
    filter::gaussian_blur_f32,
    morphology::dilate,
    point::Point,
};
use tracing::{debug, instrument};

/// Converts an image plus one face's landmarks into a soft-edged mask
#[derive(Debug, Clone)]
pub struct MaskExtractor {
    config: MaskConfig,
}

impl Default for MaskExtractor {
    fn default() -> Self {
        Self {
            config: MaskConfig::default(),
        }
    }
}

impl MaskExtractor {
    /// Create an extractor
    ///
    /// # Errors
    /// - [`SmileDesignError::InvalidConfig`] for an even or too small kernel, or a
    ///   polygon with fewer than three vertices
    pub fn new(config: MaskConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Build the mask for `image` from `landmarks`
    ///
    /// The returned mask always has the image's dimensions. Degenerate
    /// contours (zero area, repeated points) rasterize to whatever pixels they
    /// touch and never fail.
    ///
    /// # Errors
    /// - [`SmileDesignError::NoFaceDetected`] when `landmarks` is empty
    /// - [`SmileDesignError::InvalidInput`] when the contour references an index
    ///   the landmark set does not have
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn extract(&self, image: &DynamicImage, landmarks: &LandmarkSet) -> Result<Mask> {
        let (width, height) = image.dimensions();
        let filled = self.rasterize(width, height, landmarks)?;
        let dilated = self.dilate(&filled);
        let mask = Mask::from_image(self.soften(&dilated));

        let stats = mask.statistics();
        debug!(
            editable_pixels = stats.editable_pixels,
            full_pixels = stats.full_pixels,
            mean = stats.mean,
            "Mask extracted"
        );
        Ok(mask)
    }

    /// Run `detector` on `image`, then [`Self::extract`]
    ///
    /// # Errors
    /// - [`SmileDesignError::NoFaceDetected`] when the detector finds nothing
    /// - Any detector error, unchanged
    pub fn extract_with_detector(
        &self,
        image: &DynamicImage,
        detector: &dyn LandmarkDetector,
    ) -> Result<Mask> {
        let landmarks = detector
            .detect(image)?
            .ok_or(SmileDesignError::NoFaceDetected)?;
        self.extract(image, &landmarks)
    }

    /// Fill the region contour at full intensity on a zeroed canvas
    ///
    /// # Errors
    /// Same as [`Self::extract`].
    pub fn rasterize(&self, width: u32, height: u32, landmarks: &LandmarkSet) -> Result<GrayImage> {
        if landmarks.is_empty() {
            return Err(SmileDesignError::NoFaceDetected);
        }
        if width == 0 || height == 0 {
            return Err(SmileDesignError::invalid_input(format!(
                "Cannot build a mask for an empty image ({}x{})",
                width, height
            )));
        }

        let pixels = self.config.region.to_pixels(landmarks, width, height)?;
        let contour = open_contour(&pixels);

        let mut canvas = GrayImage::new(width, height);
        let fill = Luma([Mask::MAX]);
        match contour.as_slice() {
            [] => {},
            [only] => canvas.put_pixel(only.x as u32, only.y as u32, fill),
            [a, b] => draw_line_segment_mut(
                &mut canvas,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                fill,
            ),
            polygon => draw_polygon_mut(&mut canvas, polygon, fill),
        }

        if contour.len() < 3 {
            debug!(vertices = contour.len(), "Degenerate region contour");
        }
        Ok(canvas)
    }

    /// Grow the filled region by half the configured dilation side
    #[must_use]
    pub fn dilate(&self, filled: &GrayImage) -> GrayImage {
        let radius = (self.config.dilation_size / 2).min(u32::from(u8::MAX)) as u8;
        dilate(filled, Norm::LInf, radius)
    }

    /// Blur a hard-edged mask into a gradient
    #[must_use]
    pub fn soften(&self, hard: &GrayImage) -> GrayImage {
        gaussian_blur_f32(hard, kernel_sigma(self.config.blur_kernel_size))
    }
}

/// Gaussian sigma implied by a kernel side when no sigma is given
#[must_use]
pub fn kernel_sigma(kernel_size: u32) -> f32 {
    let k = kernel_size.max(3) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

/// Drop consecutive duplicates and the closing repeat of the first vertex
fn open_contour(pixels: &[(i32, i32)]) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(pixels.len());
    for &(x, y) in pixels {
        let point = Point::new(x, y);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Tint the editable region of `image` for visual inspection
#[must_use]
pub fn preview_overlay(image: &DynamicImage, mask: &Mask, tint: Rgb<u8>) -> RgbImage {
    let mut preview = image.to_rgb8();
    for (x, y, pixel) in preview.enumerate_pixels_mut() {
        let weight = u32::from(mask.get(x, y).unwrap_or(0)) / 2;
        for (channel, tint_channel) in pixel.0.iter_mut().zip(tint.0) {
            let blended =
                (u32::from(tint_channel) * weight + u32::from(*channel) * (255 - weight) + 127) / 255;
            *channel = blended as u8;
        }
    }
    preview
}
