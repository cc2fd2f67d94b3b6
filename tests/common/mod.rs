//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use smile_design::{LandmarkSet, NormalizedLandmark};

/// Points in a full face mesh with iris refinement
pub const FACE_MESH_POINTS: usize = 478;

/// Upper inner lip, left to right
pub const UPPER_INNER: [usize; 11] = [78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308];
/// Lower inner lip, right to left
pub const LOWER_INNER: [usize; 9] = [324, 318, 402, 317, 14, 87, 178, 88, 95];

pub fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Face mesh whose inner-lip contour traces the pixel rectangle
/// `left..=right` x `top..=bottom` of a `width` x `height` frame
///
/// Every other landmark sits on the forehead.
pub fn mouth_rectangle(
    width: u32,
    height: u32,
    (left, top): (f32, f32),
    (right, bottom): (f32, f32),
) -> LandmarkSet {
    let w = width as f32;
    let h = height as f32;
    let mut points = vec![NormalizedLandmark::new(0.5, 0.1); FACE_MESH_POINTS];

    let upper_step = (right - left) / (UPPER_INNER.len() - 1) as f32;
    for (i, &index) in UPPER_INNER.iter().enumerate() {
        points[index] = NormalizedLandmark::new((left + upper_step * i as f32) / w, top / h);
    }
    let lower_step = (right - left) / (LOWER_INNER.len() - 1) as f32;
    for (i, &index) in LOWER_INNER.iter().enumerate() {
        points[index] = NormalizedLandmark::new((right - lower_step * i as f32) / w, bottom / h);
    }

    LandmarkSet::new(points)
}
