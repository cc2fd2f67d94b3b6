//! Mask-weighted blending of synthesized content over the original
//!
//! `out = (s * m + o * (255 - m) + 127) / 255` per channel for integer
//! samples, linear interpolation for float samples. Weight 0 yields the
//! original sample and weight 255 the synthesized sample, exactly, at every
//! bit depth.

use crate::{
    error::{Result, SmileDesignError},
    types::Mask,
};
use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel};

/// Channel sample type that can be blended at its native depth
pub trait BlendChannel: Copy {
    /// Mix `original` toward `synthesized` by `weight` out of [`Mask::MAX`]
    fn blend(original: Self, synthesized: Self, weight: u8) -> Self;
}

impl BlendChannel for u8 {
    #[inline]
    fn blend(original: u8, synthesized: u8, weight: u8) -> u8 {
        let max = u32::from(Mask::MAX);
        let m = u32::from(weight);
        ((u32::from(synthesized) * m + u32::from(original) * (max - m) + max / 2) / max) as u8
    }
}

impl BlendChannel for u16 {
    #[inline]
    fn blend(original: u16, synthesized: u16, weight: u8) -> u16 {
        let max = u32::from(Mask::MAX);
        let m = u32::from(weight);
        ((u32::from(synthesized) * m + u32::from(original) * (max - m) + max / 2) / max) as u16
    }
}

impl BlendChannel for f32 {
    #[inline]
    fn blend(original: f32, synthesized: f32, weight: u8) -> f32 {
        match weight {
            0 => original,
            Mask::MAX => synthesized,
            m => {
                let t = f32::from(m) / f32::from(Mask::MAX);
                original + (synthesized - original) * t
            },
        }
    }
}

/// Blend two images through `mask`
///
/// All three inputs must share dimensions. The check happens before any
/// output is allocated, so a mismatch writes nothing.
///
/// # Errors
/// - [`SmileDesignError::DimensionMismatch`] if `synthesized` or `mask` differ
///   in size from `original`
pub fn composite<P>(
    original: &ImageBuffer<P, Vec<P::Subpixel>>,
    synthesized: &ImageBuffer<P, Vec<P::Subpixel>>,
    mask: &Mask,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel,
    P::Subpixel: BlendChannel,
{
    let expected = original.dimensions();
    check_dimensions(expected, synthesized.dimensions())?;
    check_dimensions(expected, mask.dimensions())?;

    let mut blended = original.clone();
    for ((out, synth), weight) in blended
        .pixels_mut()
        .zip(synthesized.pixels())
        .zip(mask.as_image().pixels())
    {
        let m = weight[0];
        if m == 0 {
            continue;
        }
        for (o, &s) in out.channels_mut().iter_mut().zip(synth.channels()) {
            *o = BlendChannel::blend(*o, s, m);
        }
    }
    Ok(blended)
}

/// [`composite`] over decoded images of any color model
///
/// The output keeps the original's color model and bit depth; the
/// synthesized image is converted to match it before blending.
///
/// # Errors
/// Same as [`composite`], plus [`SmileDesignError::InvalidInput`] for a color
/// model the image crate adds in the future.
pub fn composite_dynamic(
    original: &DynamicImage,
    synthesized: &DynamicImage,
    mask: &Mask,
) -> Result<DynamicImage> {
    let expected = original.dimensions();
    check_dimensions(expected, synthesized.dimensions())?;
    check_dimensions(expected, mask.dimensions())?;

    let blended = match original {
        DynamicImage::ImageLuma8(img) => {
            DynamicImage::ImageLuma8(composite(img, &synthesized.to_luma8(), mask)?)
        },
        DynamicImage::ImageLumaA8(img) => {
            DynamicImage::ImageLumaA8(composite(img, &synthesized.to_luma_alpha8(), mask)?)
        },
        DynamicImage::ImageRgb8(img) => {
            DynamicImage::ImageRgb8(composite(img, &synthesized.to_rgb8(), mask)?)
        },
        DynamicImage::ImageRgba8(img) => {
            DynamicImage::ImageRgba8(composite(img, &synthesized.to_rgba8(), mask)?)
        },
        DynamicImage::ImageLuma16(img) => {
            DynamicImage::ImageLuma16(composite(img, &synthesized.to_luma16(), mask)?)
        },
        DynamicImage::ImageLumaA16(img) => {
            DynamicImage::ImageLumaA16(composite(img, &synthesized.to_luma_alpha16(), mask)?)
        },
        DynamicImage::ImageRgb16(img) => {
            DynamicImage::ImageRgb16(composite(img, &synthesized.to_rgb16(), mask)?)
        },
        DynamicImage::ImageRgba16(img) => {
            DynamicImage::ImageRgba16(composite(img, &synthesized.to_rgba16(), mask)?)
        },
        DynamicImage::ImageRgb32F(img) => {
            DynamicImage::ImageRgb32F(composite(img, &synthesized.to_rgb32f(), mask)?)
        },
        DynamicImage::ImageRgba32F(img) => {
            DynamicImage::ImageRgba32F(composite(img, &synthesized.to_rgba32f(), mask)?)
        },
        other => {
            return Err(SmileDesignError::invalid_input(format!(
                "Unsupported color model for compositing: {:?}",
                other.color()
            )))
        },
    };
    Ok(blended)
}

fn check_dimensions(expected: (u32, u32), actual: (u32, u32)) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SmileDesignError::dimension_mismatch(expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_blend_endpoints_are_exact() {
        for o in [0u8, 1, 17, 128, 254, 255] {
            for s in [0u8, 3, 99, 200, 255] {
                assert_eq!(u8::blend(o, s, 0), o);
                assert_eq!(u8::blend(o, s, 255), s);
            }
        }
        assert_eq!(u8::blend(0, 255, 128), 128);

        for o in [0u16, 1, 1000, 40000, 65535] {
            for s in [0u16, 7, 32768, 65535] {
                assert_eq!(u16::blend(o, s, 0), o);
                assert_eq!(u16::blend(o, s, 255), s);
            }
        }
        assert_eq!(u16::blend(0, 65535, 128), 32896);

        assert_eq!(f32::blend(0.1, 0.7, 0), 0.1);
        assert_eq!(f32::blend(0.1, 0.7, 255), 0.7);
    }

    #[test]
    fn test_blend_is_monotonic_in_weight() {
        let mut previous = u8::blend(10, 240, 0);
        for m in 1..=255u8 {
            let current = u8::blend(10, 240, m);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_rgba_keeps_color_model() {
        let original = DynamicImage::new_rgba8(3, 3);
        let synthesized = DynamicImage::new_rgb8(3, 3);
        let mask = Mask::filled(3, 3, 255);
        let out = composite_dynamic(&original, &synthesized, &mask).unwrap();
        assert!(matches!(out, DynamicImage::ImageRgba8(_)));
    }

    #[test]
    fn test_gray_original() {
        let original = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([10])));
        let synthesized = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([200, 200, 200])));
        let out = composite_dynamic(&original, &synthesized, &Mask::filled(2, 2, 255)).unwrap();
        assert_eq!(out.to_luma8().get_pixel(0, 0), &Luma([200]));
    }

    #[test]
    fn test_unmasked_sixteen_bit_original_is_untouched() {
        let original = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(
            3,
            2,
            Rgb([1000u16, 40000, 65535]),
        ));
        let synthesized = DynamicImage::new_rgb8(3, 2);
        let out = composite_dynamic(&original, &synthesized, &Mask::filled(3, 2, 0)).unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn test_mismatched_synthesized_image() {
        let original = RgbImage::new(4, 4);
        let synthesized = RgbImage::new(4, 5);
        let err = composite(&original, &synthesized, &Mask::filled(4, 4, 0)).unwrap_err();
        match err {
            SmileDesignError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, (4, 4));
                assert_eq!(actual, (4, 5));
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
