use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use smile_design::{composite, LandmarkSet, MaskConfig, MaskExtractor, NormalizedLandmark};

const UPPER_INNER: [usize; 11] = [78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308];
const LOWER_INNER: [usize; 9] = [324, 318, 402, 317, 14, 87, 178, 88, 95];

/// Face mesh with the inner lips spanning the middle fifth of the frame
fn mouth_landmarks() -> LandmarkSet {
    let mut points = vec![NormalizedLandmark::new(0.5, 0.1); 478];
    for (i, &index) in UPPER_INNER.iter().enumerate() {
        points[index] = NormalizedLandmark::new(0.4 + 0.02 * i as f32, 0.55);
    }
    for (i, &index) in LOWER_INNER.iter().enumerate() {
        points[index] = NormalizedLandmark::new(0.6 - 0.025 * i as f32, 0.65);
    }
    LandmarkSet::new(points)
}

fn solid(size: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(size, size, Rgb(color))
}

fn benchmark_mask_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_extraction");
    group.sample_size(20);
    let landmarks = mouth_landmarks();

    for size in [512u32, 1024, 2048] {
        let image = DynamicImage::ImageRgb8(solid(size, [200, 160, 150]));
        for blur in [21u32, 41] {
            let extractor = MaskExtractor::new(MaskConfig {
                blur_kernel_size: blur,
                ..MaskConfig::default()
            })
            .expect("valid mask config");

            group.bench_with_input(
                BenchmarkId::new(format!("blur_{}", blur), size),
                &image,
                |b, image| b.iter(|| extractor.extract(black_box(image), &landmarks)),
            );
        }
    }
    group.finish();
}

fn benchmark_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    group.sample_size(20);
    let landmarks = mouth_landmarks();

    for size in [512u32, 1024, 2048] {
        let original = solid(size, [255, 0, 0]);
        let synthesized = solid(size, [0, 0, 255]);
        let mask = MaskExtractor::default()
            .extract(&DynamicImage::ImageRgb8(original.clone()), &landmarks)
            .expect("mask for benchmark image");

        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| composite(black_box(&original), black_box(&synthesized), &mask));
        });
    }
    group.finish();
}

criterion_group!(mask_benches, benchmark_mask_extraction, benchmark_composite);
criterion_main!(mask_benches);
