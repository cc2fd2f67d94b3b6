//! Compositing guarantees: untouched pixels outside the mask, exact replacement
//! inside, and no output at all on size mismatch

mod common;

use common::{mouth_rectangle, solid};
use image::{GrayImage, Luma, Rgb, RgbImage};
use smile_design::{composite, composite_dynamic, Mask, MaskExtractor, SmileDesignError};

fn noisy(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(31).wrapping_add(y.wrapping_mul(17)).wrapping_add(seed);
        Rgb([(v % 256) as u8, ((v / 3) % 256) as u8, ((v / 7) % 256) as u8])
    })
}

fn hard_mask(width: u32, height: u32) -> Mask {
    Mask::from_image(GrayImage::from_fn(width, height, |x, y| {
        Luma([if (x + y) % 3 == 0 { 255 } else { 0 }])
    }))
}

#[test]
fn zero_mask_returns_the_original() {
    let original = noisy(40, 30, 1);
    let synthesized = noisy(40, 30, 99);

    let blended = composite(&original, &synthesized, &Mask::filled(40, 30, 0)).unwrap();
    assert_eq!(blended, original);
}

#[test]
fn full_mask_returns_the_synthesized_image() {
    let original = noisy(40, 30, 1);
    let synthesized = noisy(40, 30, 99);

    let blended = composite(&original, &synthesized, &Mask::filled(40, 30, 255)).unwrap();
    assert_eq!(blended, synthesized);
}

#[test]
fn hard_mask_selects_per_pixel_and_is_idempotent() {
    let original = noisy(25, 25, 3);
    let synthesized = noisy(25, 25, 50);
    let mask = hard_mask(25, 25);

    let once = composite(&original, &synthesized, &mask).unwrap();
    for (x, y, pixel) in once.enumerate_pixels() {
        let expected = if mask.get(x, y) == Some(255) {
            synthesized.get_pixel(x, y)
        } else {
            original.get_pixel(x, y)
        };
        assert_eq!(pixel, expected, "pixel ({}, {})", x, y);
    }

    let twice = composite(&once, &synthesized, &mask).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn soft_mask_blend_is_deterministic_and_bounded() {
    let original = solid(512, 512, [255, 0, 0]).to_rgb8();
    let synthesized = solid(512, 512, [0, 0, 255]).to_rgb8();
    let landmarks = mouth_rectangle(512, 512, (206.0, 226.0), (306.0, 286.0));
    let mask = MaskExtractor::default()
        .extract(&image::DynamicImage::ImageRgb8(original.clone()), &landmarks)
        .unwrap();

    let first = composite(&original, &synthesized, &mask).unwrap();
    let second = composite(&original, &synthesized, &mask).unwrap();
    assert_eq!(first, second);

    for (x, y, pixel) in first.enumerate_pixels() {
        let m = u32::from(mask.get(x, y).unwrap());
        let expected_blue = (255 * m + 127) / 255;
        assert_eq!(u32::from(pixel[2]), expected_blue);
        assert_eq!(u32::from(pixel[0]) + u32::from(pixel[2]), 255);
    }
}

#[test]
fn mismatched_sizes_produce_no_output() {
    let original = noisy(10, 10, 0);

    let result = composite(&original, &noisy(10, 11, 0), &Mask::filled(10, 10, 255));
    assert!(matches!(
        result,
        Err(SmileDesignError::DimensionMismatch { .. })
    ));

    let result = composite(&original, &noisy(10, 10, 0), &Mask::filled(9, 10, 255));
    assert!(matches!(
        result,
        Err(SmileDesignError::DimensionMismatch { .. })
    ));
}

#[test]
fn dynamic_composite_keeps_alpha_channel() {
    let original = image::DynamicImage::new_rgba8(6, 6);
    let synthesized = solid(6, 6, [10, 20, 30]);

    let blended = composite_dynamic(&original, &synthesized, &Mask::filled(6, 6, 255)).unwrap();
    assert!(blended.color().has_alpha());
    let rgba = blended.to_rgba8();
    assert_eq!(rgba.get_pixel(3, 3).0, [10, 20, 30, 255]);
}

#[test]
fn dynamic_composite_keeps_color_model_and_depth() {
    let rgb16 = image::DynamicImage::ImageRgb16(image::ImageBuffer::from_fn(5, 4, |x, y| {
        Rgb([1000u16 + x as u16, 40000 + y as u16, 65535])
    }));
    let luma_alpha = image::DynamicImage::ImageLumaA8(image::ImageBuffer::from_fn(5, 4, |x, y| {
        image::LumaA([(x * 40 + y) as u8, 128])
    }));
    let synthesized = solid(5, 4, [0, 200, 40]);

    for original in [rgb16, luma_alpha] {
        let untouched =
            composite_dynamic(&original, &synthesized, &Mask::filled(5, 4, 0)).unwrap();
        assert_eq!(untouched.color(), original.color());
        assert_eq!(untouched, original);
    }
}

#[test]
fn sixteen_bit_full_mask_takes_synthesized_samples_exactly() {
    let original = image::DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(
        3,
        3,
        Rgb([1000u16, 40000, 65535]),
    ));
    let synthesized = image::DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(
        3,
        3,
        Rgb([12345u16, 7, 54321]),
    ));

    let replaced = composite_dynamic(&original, &synthesized, &Mask::filled(3, 3, 255)).unwrap();
    assert_eq!(replaced, synthesized);
}
