//! Multi-stage synthesis: edit, restore, normalize, composite
//!
//! Stages run strictly in order, each consuming the previous one's output.
//! Every remote call goes through the configured [`RetryPolicy`]; only the
//! restoration stage is allowed to fail without failing the request.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use crate::{
    backends::{
        EditRequest, HttpPayloadResolver, ImageEditor, ImageRestorer, PayloadResolver,
        ReplicateClient, ReplicateEditor, ReplicateRestorer,
    },
    composite::composite_dynamic,
    config::{SmileDesignConfig, SynthesisConfig},
    directive::Directive,
    error::{Result, SmileDesignError},
    retry::{Sleeper, TokioSleeper},
    types::{ImagePayload, Mask, StageTimings, SynthesisOutput},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// Drives the remote capabilities for one generation request at a time
///
/// Holds no per-request state, so one instance can serve concurrent requests.
pub struct SynthesisOrchestrator {
    config: Arc<SynthesisConfig>,
    editor: Option<Arc<dyn ImageEditor>>,
    restorer: Option<Arc<dyn ImageRestorer>>,
    resolver: Arc<dyn PayloadResolver>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for SynthesisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisOrchestrator")
            .field("config", &self.config)
            .field("editor", &self.editor.as_ref().map(|e| e.name()))
            .field("restorer", &self.restorer.as_ref().map(|r| r.name()))
            .finish_non_exhaustive()
    }
}

impl SynthesisOrchestrator {
    #[must_use]
    pub fn builder(config: Arc<SynthesisConfig>) -> SynthesisOrchestratorBuilder {
        SynthesisOrchestratorBuilder {
            config,
            editor: None,
            restorer: None,
            resolver: None,
            sleeper: None,
        }
    }

    /// Bind to the Replicate models named in `config`
    ///
    /// Missing credentials or models that fail to initialize leave the
    /// corresponding stage unbound rather than failing here; an unbound edit
    /// stage makes [`Self::synthesize`] return
    /// [`SmileDesignError::SynthesisUnavailable`].
    pub async fn connect(config: &SmileDesignConfig) -> Result<Self> {
        let synthesis = Arc::new(config.synthesis.clone());
        let mut builder = Self::builder(Arc::clone(&synthesis));

        let client = match ReplicateClient::new(&config.provider) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "Remote synthesis disabled");
                return builder.build();
            },
        };
        builder = builder.resolver(Arc::new(HttpPayloadResolver::with_client(client.http())));

        match ReplicateEditor::from_config(Arc::clone(&client), &config.provider).await {
            Ok(editor) => builder = builder.editor(Arc::new(editor)),
            Err(e) => warn!(error = %e, "No edit model available"),
        }

        if synthesis.restore.enabled {
            match ReplicateRestorer::from_config(client, &config.provider, &synthesis.restore)
                .await
            {
                Ok(restorer) => builder = builder.restorer(Arc::new(restorer)),
                Err(e) => warn!(error = %e, "No restoration model available, stage will be skipped"),
            }
        }

        builder.build()
    }

    #[must_use]
    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Whether an edit capability is bound
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.editor.is_some()
    }

    #[must_use]
    pub fn editor_name(&self) -> Option<String> {
        self.editor.as_ref().map(|editor| editor.name())
    }

    #[must_use]
    pub fn restorer_name(&self) -> Option<String> {
        self.restorer.as_ref().map(|restorer| restorer.name())
    }

    /// Produce the final image for one request
    ///
    /// With a mask, only the masked region may change and the result is
    /// blended back onto `image`. Without one the edit covers the whole
    /// frame and the normalized result is returned as is.
    ///
    /// # Errors
    /// - [`SmileDesignError::SynthesisUnavailable`] when no edit capability is bound
    /// - [`SmileDesignError::DimensionMismatch`] when `mask` and `image` differ in
    ///   size, before any remote call is made
    /// - [`SmileDesignError::RateLimited`] when the edit stage stays rate limited
    /// - [`SmileDesignError::UpstreamEmpty`] when the edit stage returns nothing
    /// - Any other edit or normalization error, unchanged
    #[instrument(
        skip_all,
        fields(width = image.width(), height = image.height(), masked = mask.is_some())
    )]
    pub async fn synthesize(
        &self,
        image: &DynamicImage,
        mask: Option<&Mask>,
        directive: &Directive,
    ) -> Result<SynthesisOutput> {
        let editor = self.editor.as_ref().ok_or_else(|| {
            SmileDesignError::unavailable("no image-edit capability is configured")
        })?;

        let dimensions = image.dimensions();
        if let Some(mask) = mask {
            if mask.dimensions() != dimensions {
                return Err(SmileDesignError::dimension_mismatch(
                    dimensions,
                    mask.dimensions(),
                ));
            }
        }

        let request = self.edit_request(image, mask, directive)?;
        let mut timings = StageTimings::default();

        // Stage 1: edit (required)
        let started = Instant::now();
        let (edited, edit_attempts) = self
            .config
            .retry
            .run("edit", self.sleeper.as_ref(), |_| editor.edit(&request))
            .instrument(info_span!("edit", editor = %editor.name()))
            .await?;
        let edited = edited
            .filter(|payload| !payload.is_empty())
            .ok_or_else(|| SmileDesignError::upstream_empty("edit stage returned no image"))?;
        timings.edit_ms = started.elapsed().as_millis() as u64;
        info!(attempts = edit_attempts, elapsed_ms = timings.edit_ms, "Edit stage complete");

        // Stage 2: restoration (best effort)
        let restored = self.restore(&edited, &mut timings).await;

        // Stage 3: normalization
        let started = Instant::now();
        let (normalized, source) = self
            .normalize(&edited, restored.as_ref(), dimensions)
            .instrument(info_span!("normalize"))
            .await?;
        timings.normalize_ms = started.elapsed().as_millis() as u64;

        // Stage 4: composite, masked requests only
        let (final_image, composited) = match mask {
            Some(mask) => {
                let started = Instant::now();
                let blended = composite_dynamic(image, &normalized, mask)?;
                timings.composite_ms = Some(started.elapsed().as_millis() as u64);
                (blended, true)
            },
            None => (normalized, false),
        };

        info!(
            composited,
            restored = source.is_restored,
            total_ms = timings.total_ms(),
            "Synthesis complete"
        );

        Ok(SynthesisOutput {
            image: final_image,
            composited,
            restored: source.is_restored,
            edit_attempts,
            source_reference: source.reference,
            timings,
        })
    }

    fn edit_request(
        &self,
        image: &DynamicImage,
        mask: Option<&Mask>,
        directive: &Directive,
    ) -> Result<EditRequest> {
        let edit = &self.config.edit;
        let mask = mask
            .map(|mask| mask.to_png_bytes().map(ImagePayload::Bytes))
            .transpose()?;

        Ok(EditRequest {
            image: ImagePayload::png(image)?,
            denoise_strength: mask.as_ref().map(|_| edit.denoise_strength),
            mask,
            prompt: directive.prompt.clone(),
            negative_prompt: directive.negative_or(&edit.negative_directive).to_string(),
            guidance_strength: edit.guidance_strength,
            inference_steps: edit.inference_steps,
        })
    }

    /// Run the restoration stage; `None` means keep the edit output
    async fn restore(&self, edited: &ImagePayload, timings: &mut StageTimings) -> Option<ImagePayload> {
        if !self.config.restore.enabled {
            return None;
        }
        let restorer = self.restorer.as_ref()?;

        self.sleeper.sleep(self.config.inter_stage_pause()).await;

        let started = Instant::now();
        let outcome = self
            .config
            .retry
            .run("restore", self.sleeper.as_ref(), |_| restorer.restore(edited))
            .instrument(info_span!("restore", restorer = %restorer.name()))
            .await;
        timings.restore_ms = Some(started.elapsed().as_millis() as u64);

        match outcome {
            Ok((Some(payload), attempts)) if !payload.is_empty() => {
                debug!(attempts, "Restoration stage complete");
                Some(payload)
            },
            Ok(_) => {
                warn!("Restoration returned no output, continuing with edit result");
                None
            },
            Err(e) => {
                warn!(error = %e, "Restoration failed, continuing with edit result");
                None
            },
        }
    }

    /// Decode the latest stage output and resample it to `dimensions`
    async fn normalize(
        &self,
        edited: &ImagePayload,
        restored: Option<&ImagePayload>,
        dimensions: (u32, u32),
    ) -> Result<(DynamicImage, Source)> {
        let decoded = match restored {
            Some(payload) => match self.resolve(payload).await {
                Ok(image) => Some((image, Source::new(payload, true))),
                Err(e) => {
                    warn!(error = %e, "Restored output unusable, continuing with edit result");
                    None
                },
            },
            None => None,
        };

        let (image, source) = match decoded {
            Some(decoded) => decoded,
            None => (self.resolve(edited).await?, Source::new(edited, false)),
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(SmileDesignError::upstream_empty("stage output decoded to an empty image"));
        }

        let (width, height) = dimensions;
        let image = if image.dimensions() == dimensions {
            image
        } else {
            debug!(
                from_width = image.width(),
                from_height = image.height(),
                to_width = width,
                to_height = height,
                "Resampling stage output to original resolution"
            );
            image.resize_exact(width, height, FilterType::Lanczos3)
        };
        Ok((image, source))
    }

    async fn resolve(&self, payload: &ImagePayload) -> Result<DynamicImage> {
        let (image, _) = self
            .config
            .retry
            .run("download", self.sleeper.as_ref(), |_| self.resolver.resolve(payload))
            .await?;
        Ok(image)
    }
}

/// Which stage produced the image that was normalized
struct Source {
    is_restored: bool,
    reference: Option<String>,
}

impl Source {
    fn new(payload: &ImagePayload, is_restored: bool) -> Self {
        Self {
            is_restored,
            reference: payload.reference().map(str::to_string),
        }
    }
}

/// Builder for [`SynthesisOrchestrator`]
pub struct SynthesisOrchestratorBuilder {
    config: Arc<SynthesisConfig>,
    editor: Option<Arc<dyn ImageEditor>>,
    restorer: Option<Arc<dyn ImageRestorer>>,
    resolver: Option<Arc<dyn PayloadResolver>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl SynthesisOrchestratorBuilder {
    #[must_use]
    pub fn editor(mut self, editor: Arc<dyn ImageEditor>) -> Self {
        self.editor = Some(editor);
        self
    }

    #[must_use]
    pub fn restorer(mut self, restorer: Arc<dyn ImageRestorer>) -> Self {
        self.restorer = Some(restorer);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn PayloadResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Validate the configuration and assemble the orchestrator
    ///
    /// Without an explicit resolver, results are fetched with a default HTTP
    /// client; without a sleeper, waits use the tokio timer.
    pub fn build(self) -> Result<SynthesisOrchestrator> {
        self.config.validate()?;

        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(HttpPayloadResolver::new(std::time::Duration::from_secs(120))?),
        };

        Ok(SynthesisOrchestrator {
            config: self.config,
            editor: self.editor,
            restorer: self.restorer,
            resolver,
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
        })
    }
}
