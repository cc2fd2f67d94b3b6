//! Smile design CLI tool
//!
//! Command-line front end for mask extraction, remote generation and offline
//! compositing.

use super::config::CliConfigBuilder;
use crate::{
    composite::composite_dynamic,
    directive::{build_directive, DirectiveFields, MaterialPreset},
    landmarks::JsonLandmarkFile,
    mask::{preview_overlay, MaskExtractor},
    orchestrator::SynthesisOrchestrator,
    services::ImageIOService,
    tracing_config::{events, init_cli_tracing, spans},
    types::Mask,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::{DynamicImage, Rgb};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument};

/// Mouth-region masking and remote smile generation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "smile-design")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON configuration file [default: $SMILE_DESIGN_CONFIG]
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Emit JSON logs (requires the tracing-json feature)
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the mouth mask for a photo from exported landmarks
    Mask(MaskArgs),
    /// Generate a new smile through the configured remote models
    Generate(GenerateArgs),
    /// Blend a synthesized image onto an original through a mask
    Composite(CompositeArgs),
    /// List the material presets
    Presets,
}

/// Mask geometry overrides shared by `mask` and `generate`
#[derive(Args, Debug, Clone, Default)]
pub struct MaskGeometryArgs {
    /// Square dilation side in pixels (odd)
    #[arg(long, value_name = "PIXELS")]
    pub dilation: Option<u32>,

    /// Blur kernel side in pixels (odd)
    #[arg(long, value_name = "PIXELS")]
    pub blur: Option<u32>,
}

#[derive(Args, Debug)]
pub struct MaskArgs {
    /// Portrait photo
    #[arg(long, short)]
    pub image: PathBuf,

    /// Landmark JSON exported by a face-mesh detector
    #[arg(long, short)]
    pub landmarks: PathBuf,

    /// Where to write the mask PNG
    #[arg(long, short)]
    pub output: PathBuf,

    /// Also write the photo with the editable region tinted
    #[arg(long, value_name = "PATH")]
    pub preview: Option<PathBuf>,

    #[command(flatten)]
    pub geometry: MaskGeometryArgs,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Portrait photo
    #[arg(long, short)]
    pub image: PathBuf,

    /// Mask PNG (same size as the photo)
    #[arg(long, conflicts_with = "landmarks")]
    pub mask: Option<PathBuf>,

    /// Landmark JSON; a mask is built from it before generation
    #[arg(long, short)]
    pub landmarks: Option<PathBuf>,

    /// Free-text directive
    #[arg(long, short)]
    pub prompt: Option<String>,

    /// Material preset (see `presets`)
    #[arg(long)]
    pub material: Option<MaterialPreset>,

    /// Style text, overrides the material preset's prompt
    #[arg(long)]
    pub style: Option<String>,

    /// Clinician notes appended to the style
    #[arg(long)]
    pub expert: Option<String>,

    /// Negative directive [default: from configuration]
    #[arg(long)]
    pub negative: Option<String>,

    /// Edit model as owner/name[:version]; repeat to build a fallback chain
    #[arg(long = "edit-model", value_name = "MODEL")]
    pub edit_models: Vec<String>,

    /// Skip the restoration stage
    #[arg(long)]
    pub no_restore: bool,

    /// Where to write the final image
    #[arg(long, short)]
    pub output: PathBuf,

    #[command(flatten)]
    pub geometry: MaskGeometryArgs,
}

#[derive(Args, Debug)]
pub struct CompositeArgs {
    #[arg(long)]
    pub original: PathBuf,

    /// Resampled to the original's size when they differ
    #[arg(long)]
    pub synthesized: PathBuf,

    #[arg(long)]
    pub mask: PathBuf,

    #[arg(long, short)]
    pub output: PathBuf,
}

/// Main entry point for the CLI application
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id =
        init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;
    let span = spans::session(&session_id, command_name(&cli.command));

    async {
        match &cli.command {
            Command::Mask(args) => run_mask(&cli, args),
            Command::Generate(args) => run_generate(&cli, args).await,
            Command::Composite(args) => run_composite(args),
            Command::Presets => {
                print_presets();
                Ok(())
            },
        }
    }
    .instrument(span)
    .await
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Mask(_) => "mask",
        Command::Generate(_) => "generate",
        Command::Composite(_) => "composite",
        Command::Presets => "presets",
    }
}

fn run_mask(cli: &Cli, args: &MaskArgs) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli, &args.geometry, None)?;
    let extractor = MaskExtractor::new(config.mask).context("Invalid mask configuration")?;

    let image = load(&args.image)?;
    let mask = extract_mask(&extractor, &image, &args.image, &args.landmarks)?;

    mask.save_png(&args.output)
        .with_context(|| format!("Failed to write mask to {}", args.output.display()))?;
    events::progress(&format!("Mask written to {}", args.output.display()));

    if let Some(preview_path) = &args.preview {
        let preview = DynamicImage::ImageRgb8(preview_overlay(&image, &mask, Rgb([0, 200, 255])));
        ImageIOService::save_image(&preview, preview_path)
            .with_context(|| format!("Failed to write preview to {}", preview_path.display()))?;
        events::progress(&format!("Preview written to {}", preview_path.display()));
    }

    let stats = mask.statistics();
    println!(
        "{}x{} mask, {} editable pixels ({:.1}% of frame)",
        mask.width(),
        mask.height(),
        stats.editable_pixels,
        stats.editable_pixels as f64 * 100.0 / stats.total_pixels.max(1) as f64
    );
    Ok(())
}

async fn run_generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli, &args.geometry, Some(args))?;

    let directive = build_directive(&DirectiveFields {
        prompt: args.prompt.clone(),
        style_prompt: args.style.clone(),
        expert_prompt: args.expert.clone(),
        negative_prompt: args.negative.clone(),
        material: args.material,
    })
    .context("Provide --prompt, --style or --material")?;
    debug!(prompt = %directive.prompt, "Directive built");

    let image = load(&args.image)?;
    let mask = match (&args.mask, &args.landmarks) {
        (Some(mask_path), _) => Some(Mask::from_image(load(mask_path)?.to_luma8())),
        (None, Some(landmarks)) => {
            let extractor =
                MaskExtractor::new(config.mask.clone()).context("Invalid mask configuration")?;
            Some(extract_mask(&extractor, &image, &args.image, landmarks)?)
        },
        (None, None) => {
            info!("No mask given, using whole-frame editing");
            None
        },
    };

    let spinner = spinner("Connecting to remote models");
    let orchestrator = SynthesisOrchestrator::connect(&config)
        .await
        .context("Failed to set up synthesis")?;
    if !orchestrator.is_available() {
        spinner.finish_and_clear();
        bail!("No edit model is available. Set REPLICATE_API_TOKEN and check the configured edit models.");
    }

    if config.synthesis.restore.enabled && orchestrator.restorer_name().is_none() {
        events::warning_with_recommendation(
            "Restoration model unavailable, output will not be restored",
            "check the configured restore models or pass --no-restore",
        );
    }

    spinner.set_message("Generating");
    let started = Instant::now();
    let span = spans::generation("cli", mask.is_some());
    let output = orchestrator
        .synthesize(&image, mask.as_ref(), &directive)
        .instrument(span)
        .await;
    spinner.finish_and_clear();
    let output = output.context("Generation failed")?;

    ImageIOService::save_image(&output.image, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    events::stage_timing("edit", output.timings.edit_ms);
    if let Some(restore_ms) = output.timings.restore_ms {
        events::stage_timing("restore", restore_ms);
    }
    events::stage_timing("normalize", output.timings.normalize_ms);
    println!(
        "Wrote {} ({}x{}, {} edit attempt(s), restored: {}, composited: {}) in {:.1}s",
        args.output.display(),
        output.image.width(),
        output.image.height(),
        output.edit_attempts,
        output.restored,
        output.composited,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run_composite(args: &CompositeArgs) -> Result<()> {
    let original = load(&args.original)?;
    let mut synthesized = load(&args.synthesized)?;
    let mask = Mask::from_image(load(&args.mask)?.to_luma8());

    if synthesized.width() != original.width() || synthesized.height() != original.height() {
        info!("Resampling synthesized image to the original's size");
        synthesized = synthesized.resize_exact(
            original.width(),
            original.height(),
            image::imageops::FilterType::Lanczos3,
        );
    }

    let blended = composite_dynamic(&original, &synthesized, &mask)
        .context("Mask does not match the original image")?;
    ImageIOService::save_image(&blended, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn print_presets() {
    for preset in MaterialPreset::ALL {
        println!("{:<10} {}", preset.id(), preset.display_name());
        println!("           {}", preset.prompt());
    }
}

fn load(path: &Path) -> Result<DynamicImage> {
    ImageIOService::load_image(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn extract_mask(
    extractor: &MaskExtractor,
    image: &DynamicImage,
    image_path: &Path,
    landmarks_path: &Path,
) -> Result<Mask> {
    let span = spans::mask_extraction(image_path, (image.width(), image.height()));
    let _entered = span.enter();

    let landmarks = JsonLandmarkFile::load(landmarks_path)
        .with_context(|| format!("Failed to read landmarks from {}", landmarks_path.display()))?;
    extractor
        .extract_with_detector(image, &landmarks)
        .with_context(|| format!("Failed to build mask for {}", image_path.display()))
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
