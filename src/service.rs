//! Request-boundary service
//!
//! Wraps the mask extractor and synthesis orchestrator behind the two
//! operations a front end calls: build a mask for an uploaded photo, and
//! generate a new smile from a photo, an optional mask and a directive.
//! Payloads cross this boundary as base64 strings or `data:` URLs.

use crate::{
    config::SmileDesignConfig,
    directive::{build_directive, DirectiveFields},
    error::{ErrorKind, Result, SmileDesignError},
    landmarks::LandmarkDetector,
    mask::MaskExtractor,
    orchestrator::SynthesisOrchestrator,
    services::ImageIOService,
    types::{GenerationRecord, Mask},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument, warn};

/// Receives one record per successful generation
#[async_trait]
pub trait GenerationSink: Send + Sync {
    async fn record(&self, record: GenerationRecord) -> Result<()>;
}

/// Sink that drops every record
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl GenerationSink for DiscardSink {
    async fn record(&self, _record: GenerationRecord) -> Result<()> {
        Ok(())
    }
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<GenerationRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<GenerationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationSink for MemorySink {
    async fn record(&self, record: GenerationRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

/// Mask for an uploaded photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskResponse {
    /// Base64 PNG, single channel
    pub mask: String,
    /// Base64 JPEG of the decoded upload
    pub image: String,
    pub width: u32,
    pub height: u32,
}

/// Generation request as sent by a front end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Base64 or `data:` URL
    pub image: String,
    /// Base64 or `data:` URL; absent or blank selects whole-frame editing
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(flatten)]
    pub directive: DirectiveFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Final image as a `data:image/png;base64,...` URL
    pub image_url: String,
}

/// Structured failure returned across the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
}

impl From<&SmileDesignError> for ErrorResponse {
    fn from(error: &SmileDesignError) -> Self {
        let kind = error.kind();
        Self {
            kind,
            message: error.to_string(),
            status: kind.status_code(),
        }
    }
}

/// Readiness report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy` when synthesis is available, `degraded` otherwise
    pub status: String,
    pub synthesis_available: bool,
    pub editor: Option<String>,
    pub restorer: Option<String>,
}

/// Masking and synthesis behind one request-level API
pub struct SmileDesignService {
    detector: Arc<dyn LandmarkDetector>,
    extractor: MaskExtractor,
    orchestrator: SynthesisOrchestrator,
    sink: Arc<dyn GenerationSink>,
}

impl std::fmt::Debug for SmileDesignService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmileDesignService")
            .field("extractor", &self.extractor)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl SmileDesignService {
    #[must_use]
    pub fn new(
        detector: Arc<dyn LandmarkDetector>,
        extractor: MaskExtractor,
        orchestrator: SynthesisOrchestrator,
    ) -> Self {
        Self {
            detector,
            extractor,
            orchestrator,
            sink: Arc::new(DiscardSink),
        }
    }

    /// Build every component from one configuration
    pub async fn connect(config: &SmileDesignConfig, detector: Arc<dyn LandmarkDetector>) -> Result<Self> {
        let extractor = MaskExtractor::new(config.mask.clone())?;
        let orchestrator = SynthesisOrchestrator::connect(config).await?;
        Ok(Self::new(detector, extractor, orchestrator))
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn GenerationSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn orchestrator(&self) -> &SynthesisOrchestrator {
        &self.orchestrator
    }

    /// Detect the face in an uploaded photo and build its mask
    ///
    /// # Errors
    /// - [`SmileDesignError::InvalidInput`] when the upload does not decode
    /// - [`SmileDesignError::NoFaceDetected`] when the detector finds no face
    #[instrument(skip_all, fields(bytes = upload.len()))]
    pub fn generate_mask(&self, upload: &[u8]) -> Result<MaskResponse> {
        let image = ImageIOService::load_from_bytes(upload)
            .map_err(|e| SmileDesignError::invalid_input(format!("could not decode image: {}", e)))?;
        let mask = self
            .extractor
            .extract_with_detector(&image, self.detector.as_ref())?;

        Ok(MaskResponse {
            mask: BASE64.encode(mask.to_png_bytes()?),
            image: BASE64.encode(ImageIOService::encode_jpeg(&image, 95)?),
            width: image.width(),
            height: image.height(),
        })
    }

    /// Run one generation and hand the result to the sink
    ///
    /// A sink failure is logged and does not fail the request.
    ///
    /// # Errors
    /// - [`SmileDesignError::InvalidInput`] for undecodable payloads or an empty directive
    /// - Any error of [`SynthesisOrchestrator::synthesize`]
    #[instrument(skip_all, fields(owner_id = %owner_id))]
    pub async fn generate(&self, owner_id: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let directive = build_directive(&request.directive)?;
        let image = ImageIOService::decode_base64_image(&request.image)?;
        let mask = match request.mask.as_deref().map(str::trim) {
            Some(encoded) if !ImageIOService::strip_data_url_header(encoded).is_empty() => {
                let decoded = ImageIOService::decode_base64_image(encoded)?;
                Some(Mask::from_image(decoded.to_luma8()))
            },
            _ => None,
        };

        let output = self
            .orchestrator
            .synthesize(&image, mask.as_ref(), &directive)
            .await?;
        let image_url = output.to_data_url()?;

        let record = GenerationRecord {
            owner_id: owner_id.to_string(),
            directive: directive.prompt.clone(),
            image: image_url.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.sink.record(record).await {
            warn!(error = %e, "Failed to record generation");
        }

        info!(composited = output.composited, restored = output.restored, "Generation complete");
        Ok(GenerateResponse { image_url })
    }

    #[must_use]
    pub fn health(&self) -> HealthStatus {
        let synthesis_available = self.orchestrator.is_available();
        HealthStatus {
            status: if synthesis_available { "healthy" } else { "degraded" }.to_string(),
            synthesis_available,
            editor: self.orchestrator.editor_name(),
            restorer: self.orchestrator.restorer_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::test_utils::{MockImageEditor, RecordingSleeper},
        config::SynthesisConfig,
        directive::MaterialPreset,
        landmarks::StaticLandmarks,
    };
    use image::{DynamicImage, Rgb, RgbImage};

    fn service(editor: Option<Arc<MockImageEditor>>) -> SmileDesignService {
        let mut builder = SynthesisOrchestrator::builder(Arc::new(SynthesisConfig::default()))
            .sleeper(Arc::new(RecordingSleeper::default()));
        if let Some(editor) = editor {
            builder = builder.editor(editor);
        }
        SmileDesignService::new(
            Arc::new(StaticLandmarks::default()),
            MaskExtractor::default(),
            builder.build().unwrap(),
        )
    }

    fn png_base64(image: &DynamicImage) -> String {
        BASE64.encode(ImageIOService::encode_png(image).unwrap())
    }

    #[test]
    fn test_error_response_mapping() {
        let response = ErrorResponse::from(&SmileDesignError::NoFaceDetected);
        assert_eq!(response.kind, ErrorKind::NoFaceDetected);
        assert_eq!(response.status, 400);

        let response = ErrorResponse::from(&SmileDesignError::RateLimited {
            attempts: 3,
            message: "429".to_string(),
        });
        assert_eq!(response.status, 429);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "rate_limited");
    }

    #[test]
    fn test_generate_mask_without_face() {
        let service = service(None);
        let upload = ImageIOService::encode_png(&DynamicImage::new_rgb8(16, 16)).unwrap();
        assert!(matches!(
            service.generate_mask(&upload),
            Err(SmileDesignError::NoFaceDetected)
        ));
        assert!(matches!(
            service.generate_mask(b"garbage"),
            Err(SmileDesignError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_health_reports_binding() {
        let health = service(None).health();
        assert_eq!(health.status, "degraded");
        assert!(!health.synthesis_available);

        let editor = Arc::new(MockImageEditor::returning(DynamicImage::new_rgb8(4, 4)));
        let health = service(Some(editor)).health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.editor.as_deref(), Some("mock-editor"));
    }

    #[test]
    fn test_generate_request_accepts_flat_fields() {
        let request: GenerateRequest = serde_json::from_str(
            r#"{"image":"AAAA","mask":"","prompt":"legacy","material":"zirconium"}"#,
        )
        .unwrap();
        assert_eq!(request.directive.material, Some(MaterialPreset::Zirconium));
        assert_eq!(request.directive.prompt.as_deref(), Some("legacy"));
    }

    #[tokio::test]
    async fn test_generate_records_result() {
        let synthesized = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 255])));
        let editor = Arc::new(MockImageEditor::returning(synthesized));
        let sink = Arc::new(MemorySink::default());
        let service = service(Some(editor)).with_sink(sink.clone());

        let original = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let request = GenerateRequest {
            image: format!("data:image/png;base64,{}", png_base64(&original)),
            mask: Some(png_base64(&DynamicImage::new_luma8(8, 8))),
            directive: DirectiveFields {
                material: Some(MaterialPreset::Whitening),
                ..DirectiveFields::default()
            },
        };

        let response = service.generate("clinic-7", &request).await.unwrap();
        assert!(response.image_url.starts_with("data:image/png;base64,"));

        let result = ImageIOService::decode_base64_image(&response.image_url).unwrap();
        assert_eq!(result.to_rgb8().get_pixel(3, 3), &Rgb([255, 0, 0]));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].owner_id, "clinic-7");
        assert_eq!(records[0].directive, MaterialPreset::Whitening.prompt());
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_directive() {
        let editor = Arc::new(MockImageEditor::returning(DynamicImage::new_rgb8(4, 4)));
        let service = service(Some(Arc::clone(&editor)));
        let request = GenerateRequest {
            image: png_base64(&DynamicImage::new_rgb8(4, 4)),
            ..GenerateRequest::default()
        };
        assert!(matches!(
            service.generate("u", &request).await,
            Err(SmileDesignError::InvalidInput(_))
        ));
        assert_eq!(editor.call_count(), 0);
    }
}
