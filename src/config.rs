//! Configuration types for mask extraction and synthesis
//!
//! One [`SmileDesignConfig`] is built at process start (from defaults, a JSON
//! file and environment overrides) and handed by reference to the components
//! that need it. Nothing in the crate reads process-wide state after that.

use crate::{
    error::{Result, SmileDesignError},
    retry::RetryPolicy,
    types::RegionPolygon,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the remote API token
pub const TOKEN_ENV: &str = "REPLICATE_API_TOKEN";
/// Alternate token variable accepted for compatibility
pub const TOKEN_ENV_ALT: &str = "REPLICATE_API_KEY";
/// Environment variable overriding the remote API base URL
pub const API_BASE_ENV: &str = "REPLICATE_API_BASE";
/// Environment variable pointing at a JSON configuration file
pub const CONFIG_PATH_ENV: &str = "SMILE_DESIGN_CONFIG";

const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// Negative directive used when a request supplies none
pub const DEFAULT_NEGATIVE_DIRECTIVE: &str = "fake, sticker, pasted on, cartoon, illustration, low quality, blur, distorted lips, bad anatomy, extra teeth, metal, braces";

/// Mask geometry parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Contour of the editable region
    pub region: RegionPolygon,
    /// Side of the square dilation neighborhood, in pixels (odd)
    pub dilation_size: u32,
    /// Side of the blur kernel, in pixels (odd)
    pub blur_kernel_size: u32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            region: RegionPolygon::inner_lips(),
            dilation_size: 15,
            blur_kernel_size: 21,
        }
    }
}

impl MaskConfig {
    pub fn validate(&self) -> Result<()> {
        self.region.validate()?;
        for (name, size) in [
            ("dilation size", self.dilation_size),
            ("blur kernel size", self.blur_kernel_size),
        ] {
            if size < 3 || size % 2 == 0 {
                return Err(SmileDesignError::invalid_config(format!(
                    "Invalid {}: {} (must be an odd number >= 3)",
                    name, size
                )));
            }
        }
        // imageproc dilation radius is a u8
        if self.dilation_size / 2 > u32::from(u8::MAX) {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid dilation size: {} (valid range: 3-511)",
                self.dilation_size
            )));
        }
        Ok(())
    }
}

/// Parameters sent to the image-edit capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditParameters {
    /// Negative directive used when the request does not carry one
    pub negative_directive: String,
    /// How strongly the model follows the directive
    pub guidance_strength: f32,
    /// Denoising strength for masked edits (1.0 = treat the region as new)
    pub denoise_strength: f32,
    pub inference_steps: u32,
}

impl Default for EditParameters {
    fn default() -> Self {
        Self {
            negative_directive: DEFAULT_NEGATIVE_DIRECTIVE.to_string(),
            guidance_strength: 20.0,
            denoise_strength: 0.9,
            inference_steps: 30,
        }
    }
}

/// Parameters for the best-effort restoration stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreParameters {
    pub enabled: bool,
    /// Balance between quality (0.0) and fidelity to the input (1.0)
    pub fidelity: f32,
}

impl Default for RestoreParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            fidelity: 0.7,
        }
    }
}

/// Orchestrator behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub retry: RetryPolicy,
    pub edit: EditParameters,
    pub restore: RestoreParameters,
    /// Pause between the edit and restoration calls, in milliseconds
    pub inter_stage_pause_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            edit: EditParameters::default(),
            restore: RestoreParameters::default(),
            inter_stage_pause_ms: 1000,
        }
    }
}

impl SynthesisConfig {
    #[must_use]
    pub fn inter_stage_pause(&self) -> Duration {
        Duration::from_millis(self.inter_stage_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        if !(0.0..=1.0).contains(&self.edit.denoise_strength) {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid denoise strength: {} (valid range: 0.0-1.0)",
                self.edit.denoise_strength
            )));
        }
        if self.edit.guidance_strength <= 0.0 {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid guidance strength: {} (must be positive)",
                self.edit.guidance_strength
            )));
        }
        if self.edit.inference_steps == 0 {
            return Err(SmileDesignError::invalid_config(
                "Invalid inference steps: 0 (must be at least 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.restore.fidelity) {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid restoration fidelity: {} (valid range: 0.0-1.0)",
                self.restore.fidelity
            )));
        }
        Ok(())
    }
}

/// A remote model identified as `owner/name` with an optional pinned version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBinding {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModelBinding {
    #[must_use]
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Parse `owner/name` or `owner/name:version`
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (path, version) = match spec.split_once(':') {
            Some((path, version)) => (path, Some(version.trim())),
            None => (spec, None),
        };
        let (owner, name) = path.split_once('/').ok_or_else(|| {
            SmileDesignError::invalid_config(format!(
                "Invalid model binding '{}': expected owner/name[:version]",
                spec
            ))
        })?;
        if owner.is_empty() || name.is_empty() || version == Some("") {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid model binding '{}': expected owner/name[:version]",
                spec
            )));
        }

        let binding = Self::new(owner.trim(), name.trim());
        Ok(match version {
            Some(version) => binding.with_version(version),
            None => binding,
        })
    }

    /// `owner/name`
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}:{}", self.owner, self.name, version),
            None => write!(f, "{}/{}", self.owner, self.name),
        }
    }
}

/// Remote capability endpoints and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    /// Never written back out
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Edit models in priority order; the first that initializes is used
    pub edit_bindings: Vec<ModelBinding>,
    /// Restoration models in priority order
    pub restore_bindings: Vec<ModelBinding>,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: None,
            edit_bindings: vec![
                ModelBinding::new("stability-ai", "stable-diffusion-inpainting"),
                ModelBinding::new("lucataco", "sdxl-inpainting"),
            ],
            restore_bindings: vec![ModelBinding::new("sczhou", "codeformer")],
            request_timeout_secs: 120,
            poll_interval_ms: 1000,
            poll_timeout_secs: 180,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Token if one is set and non-blank
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_base.starts_with("https://") || self.api_base.starts_with("http://")) {
            return Err(SmileDesignError::invalid_config(format!(
                "Invalid API base URL: {}",
                self.api_base
            )));
        }
        if self.request_timeout_secs == 0 || self.poll_timeout_secs == 0 {
            return Err(SmileDesignError::invalid_config(
                "Request and poll timeouts must be positive",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SmileDesignError::invalid_config(
                "Poll interval must be positive",
            ));
        }
        Ok(())
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmileDesignConfig {
    pub mask: MaskConfig,
    pub synthesis: SynthesisConfig,
    pub provider: ProviderConfig,
}

impl SmileDesignConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> SmileDesignConfigBuilder {
        SmileDesignConfigBuilder::default()
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.mask.validate()?;
        self.synthesis.validate()?;
        self.provider.validate()
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SmileDesignError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the file named by `SMILE_DESIGN_CONFIG`, then env overrides
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply token and API base from the environment
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(token) = non_empty_env(TOKEN_ENV).or_else(|| non_empty_env(TOKEN_ENV_ALT)) {
            self.provider.api_token = Some(token);
        }
        if let Some(base) = non_empty_env(API_BASE_ENV) {
            self.provider.api_base = base.trim_end_matches('/').to_string();
        }
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Builder for [`SmileDesignConfig`]
#[derive(Debug, Default)]
pub struct SmileDesignConfigBuilder {
    config: SmileDesignConfig,
}

impl SmileDesignConfigBuilder {
    #[must_use]
    pub fn region(mut self, region: RegionPolygon) -> Self {
        self.config.mask.region = region;
        self
    }

    #[must_use]
    pub fn dilation_size(mut self, size: u32) -> Self {
        self.config.mask.dilation_size = size;
        self
    }

    #[must_use]
    pub fn blur_kernel_size(mut self, size: u32) -> Self {
        self.config.mask.blur_kernel_size = size;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.synthesis.retry = retry;
        self
    }

    #[must_use]
    pub fn guidance_strength(mut self, strength: f32) -> Self {
        self.config.synthesis.edit.guidance_strength = strength;
        self
    }

    #[must_use]
    pub fn denoise_strength(mut self, strength: f32) -> Self {
        self.config.synthesis.edit.denoise_strength = strength;
        self
    }

    #[must_use]
    pub fn negative_directive<S: Into<String>>(mut self, negative: S) -> Self {
        self.config.synthesis.edit.negative_directive = negative.into();
        self
    }

    #[must_use]
    pub fn restoration(mut self, enabled: bool) -> Self {
        self.config.synthesis.restore.enabled = enabled;
        self
    }

    #[must_use]
    pub fn inter_stage_pause(mut self, pause: Duration) -> Self {
        self.config.synthesis.inter_stage_pause_ms = pause.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn api_base<S: Into<String>>(mut self, base: S) -> Self {
        self.config.provider.api_base = base.into();
        self
    }

    #[must_use]
    pub fn api_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.provider.api_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn edit_bindings(mut self, bindings: Vec<ModelBinding>) -> Self {
        self.config.provider.edit_bindings = bindings;
        self
    }

    #[must_use]
    pub fn restore_bindings(mut self, bindings: Vec<ModelBinding>) -> Self {
        self.config.provider.restore_bindings = bindings;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<SmileDesignConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SmileDesignConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mask.dilation_size, 15);
        assert_eq!(config.mask.blur_kernel_size, 21);
        assert_eq!(config.synthesis.retry.max_attempts, 3);
        assert_eq!(config.synthesis.edit.guidance_strength, 20.0);
        assert_eq!(config.provider.edit_bindings.len(), 2);
    }

    #[test]
    fn test_builder_validation() {
        let result = SmileDesignConfig::builder().dilation_size(14).build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("dilation size"));

        let result = SmileDesignConfig::builder().denoise_strength(1.5).build();
        assert!(result.unwrap_err().to_string().contains("0.0-1.0"));

        let config = SmileDesignConfig::builder()
            .blur_kernel_size(31)
            .restoration(false)
            .inter_stage_pause(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(config.mask.blur_kernel_size, 31);
        assert!(!config.synthesis.restore.enabled);
        assert_eq!(
            config.synthesis.inter_stage_pause(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_model_binding_parse() {
        let binding = ModelBinding::parse("sczhou/codeformer").unwrap();
        assert_eq!(binding.slug(), "sczhou/codeformer");
        assert!(binding.version.is_none());

        let binding = ModelBinding::parse("stability-ai/sdxl:abc123").unwrap();
        assert_eq!(binding.version.as_deref(), Some("abc123"));
        assert_eq!(binding.to_string(), "stability-ai/sdxl:abc123");

        assert!(ModelBinding::parse("no-slash").is_err());
        assert!(ModelBinding::parse("/name").is_err());
        assert!(ModelBinding::parse("owner/name:").is_err());
    }

    #[test]
    fn test_token_is_never_serialized() {
        let config = SmileDesignConfig::builder()
            .api_token("r8_secret")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("r8_secret"));
        assert_eq!(config.provider.token(), Some("r8_secret"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "mask": { "dilation_size": 9 }, "synthesis": { "inter_stage_pause_ms": 0 } }"#,
        )
        .unwrap();

        let config = SmileDesignConfig::from_json_file(&path).unwrap();
        assert_eq!(config.mask.dilation_size, 9);
        assert_eq!(config.mask.blur_kernel_size, 21);
        assert_eq!(config.synthesis.inter_stage_pause_ms, 0);
        assert_eq!(config.mask.region, RegionPolygon::inner_lips());
    }

    #[test]
    fn test_invalid_json_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "mask": { "blur_kernel_size": 4 } }"#).unwrap();
        assert!(SmileDesignConfig::from_json_file(&path).is_err());

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            SmileDesignConfig::from_json_file(&missing),
            Err(SmileDesignError::Io(_))
        ));
    }
}
