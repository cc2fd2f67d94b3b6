//! Remote capability backends
//!
//! This module provides the seams between the orchestrator and the remote
//! models it drives:
//! - [`ImageEditor`] performs the required edit stage
//! - [`ImageRestorer`] performs the optional restoration stage
//! - [`PayloadResolver`] turns whatever a capability returned into pixels
//!
//! Concrete implementations talk to the Replicate predictions API
//! ([`replicate`]) and fetch results over HTTP ([`resolver`]).

pub mod replicate;
pub mod resolver;

// Mock capabilities for unit and integration tests
pub mod test_utils;

pub use self::replicate::{ReplicateClient, ReplicateEditor, ReplicateRestorer};
pub use self::resolver::HttpPayloadResolver;

use crate::{
    config::ModelBinding,
    error::{Result, SmileDesignError},
    types::ImagePayload,
};
use async_trait::async_trait;
use image::DynamicImage;
use std::future::Future;

/// Everything the edit capability needs for one call
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub image: ImagePayload,
    /// `None` selects whole-frame instruction editing
    pub mask: Option<ImagePayload>,
    pub prompt: String,
    pub negative_prompt: String,
    pub guidance_strength: f32,
    /// Only meaningful for masked edits
    pub denoise_strength: Option<f32>,
    pub inference_steps: u32,
}

impl EditRequest {
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }
}

/// Required edit stage
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> String;

    /// `Ok(None)` means the call succeeded but produced nothing
    async fn edit(&self, request: &EditRequest) -> Result<Option<ImagePayload>>;
}

/// Optional, best-effort restoration stage
#[async_trait]
pub trait ImageRestorer: Send + Sync {
    fn name(&self) -> String;

    async fn restore(&self, image: &ImagePayload) -> Result<Option<ImagePayload>>;
}

/// Decodes a capability result into pixels
#[async_trait]
pub trait PayloadResolver: Send + Sync {
    async fn resolve(&self, payload: &ImagePayload) -> Result<DynamicImage>;
}

/// Initialize the first binding that works, trying them in order
///
/// # Errors
/// - [`SmileDesignError::SynthesisUnavailable`] when the list is empty or no
///   binding initializes; the message names every binding tried
pub async fn select_binding<T, F, Fut>(bindings: &[ModelBinding], mut init: F) -> Result<T>
where
    F: FnMut(ModelBinding) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if bindings.is_empty() {
        return Err(SmileDesignError::unavailable("no model bindings configured"));
    }

    let mut failures = Vec::with_capacity(bindings.len());
    for binding in bindings {
        match init(binding.clone()).await {
            Ok(capability) => {
                tracing::info!(binding = %binding, "Model binding initialized");
                return Ok(capability);
            },
            Err(e) => {
                tracing::warn!(binding = %binding, error = %e, "Model binding failed to initialize");
                failures.push(format!("{}: {}", binding, e));
            },
        }
    }

    Err(SmileDesignError::unavailable(format!(
        "no model binding initialized ({})",
        failures.join("; ")
    )))
}
