#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Smile Design Library
//!
//! Mouth-region masking and multi-stage remote image synthesis for smile
//! previews.
//!
//! A portrait and its face landmarks go in; a soft-edged mask of the inner
//! lips comes out. The portrait, the mask and a textual directive are then
//! sent through a remote inpainting model, optionally through a face
//! restoration model, and the result is blended back onto the original so
//! that every pixel outside the mask is byte-identical to the input.
//!
//! ## Features
//!
//! - **Mask extraction**: polygon fill, square dilation and Gaussian feathering
//! - **Pixel-exact compositing**: integer blending, exact at mask 0 and 255
//! - **Remote synthesis**: edit stage with rate-limit retry, best-effort restoration
//! - **Model fallback**: ordered lists of candidate models per stage
//! - **Material presets**: the six built-in dental material directives
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smile_design::{
//!     Directive, JsonLandmarkFile, MaskExtractor, SmileDesignConfig, SynthesisOrchestrator,
//! };
//! use smile_design::services::ImageIOService;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SmileDesignConfig::from_env()?;
//! let image = ImageIOService::load_image("portrait.jpg")?;
//! let landmarks = JsonLandmarkFile::load("portrait.landmarks.json")?;
//!
//! let extractor = MaskExtractor::new(config.mask.clone())?;
//! let mask = extractor.extract_with_detector(&image, &landmarks)?;
//!
//! let orchestrator = SynthesisOrchestrator::connect(&config).await?;
//! let directive = Directive::new("natural white teeth, even spacing")?;
//! let output = orchestrator.synthesize(&image, Some(&mask), &directive).await?;
//! ImageIOService::save_image(&output.image, "preview.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface and tracing subscriber setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! smile-design = { version = "0.1", default-features = false }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod composite;
pub mod config;
pub mod directive;
pub mod error;
pub mod landmarks;
pub mod mask;
pub mod orchestrator;
pub mod retry;
pub mod service;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Public API exports
pub use backends::{
    select_binding, EditRequest, HttpPayloadResolver, ImageEditor, ImageRestorer,
    PayloadResolver, ReplicateClient, ReplicateEditor, ReplicateRestorer,
};
pub use composite::{composite, composite_dynamic};
pub use config::{
    EditParameters, MaskConfig, ModelBinding, ProviderConfig, RestoreParameters,
    SmileDesignConfig, SmileDesignConfigBuilder, SynthesisConfig,
};
pub use directive::{build_directive, Directive, DirectiveFields, MaterialPreset};
pub use error::{ErrorKind, Result, SmileDesignError};
pub use landmarks::{JsonLandmarkFile, LandmarkDetector, StaticLandmarks};
pub use mask::{preview_overlay, MaskExtractor};
pub use orchestrator::{SynthesisOrchestrator, SynthesisOrchestratorBuilder};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use service::{
    DiscardSink, ErrorResponse, GenerateRequest, GenerateResponse, GenerationSink, HealthStatus,
    MaskResponse, MemorySink, SmileDesignService,
};
pub use services::ImageIOService;
pub use types::{
    GenerationRecord, ImagePayload, LandmarkSet, Mask, MaskStatistics, NormalizedLandmark,
    RegionPolygon, StageTimings, SynthesisOutput,
};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Build the mouth mask for an encoded image
///
/// Convenience wrapper over [`MaskExtractor::extract`] for callers holding
/// upload bytes rather than a decoded image.
///
/// # Examples
///
/// ```rust,no_run
/// use smile_design::{extract_mask_from_bytes, JsonLandmarkFile, LandmarkDetector, MaskConfig};
///
/// # fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let image = image::load_from_memory(&upload)?;
/// let landmarks = JsonLandmarkFile::load("face.json")?
///     .detect(&image)?
///     .unwrap_or_default();
/// let mask = extract_mask_from_bytes(&upload, &landmarks, &MaskConfig::default())?;
/// mask.save_png("mask.png")?;
/// # Ok(())
/// # }
/// ```
pub fn extract_mask_from_bytes(
    image_bytes: &[u8],
    landmarks: &LandmarkSet,
    config: &MaskConfig,
) -> Result<Mask> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    MaskExtractor::new(config.clone())?.extract(&image, landmarks)
}

/// Run one synthesis against the remote models named in `config`
///
/// Connects a fresh [`SynthesisOrchestrator`] for the call. Long-lived
/// callers should connect once and reuse the orchestrator.
pub async fn generate_smile(
    image: &image::DynamicImage,
    mask: Option<&Mask>,
    directive: &Directive,
    config: &SmileDesignConfig,
) -> Result<SynthesisOutput> {
    let orchestrator = SynthesisOrchestrator::connect(config).await?;
    orchestrator.synthesize(image, mask, directive).await
}
