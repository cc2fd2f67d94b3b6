//! Replicate predictions API backend
//!
//! Predictions are created with `Prefer: wait`, so short jobs come back
//! finished from the first request. Anything still running is polled through
//! its `urls.get` link until it reaches a terminal status.

use crate::{
    backends::{select_binding, EditRequest, ImageEditor, ImageRestorer},
    config::{ModelBinding, ProviderConfig, RestoreParameters},
    error::{Result, SmileDesignError},
    types::ImagePayload,
};
use async_trait::async_trait;
use instant::Instant;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

/// Authenticated access to one Replicate API endpoint
#[derive(Clone)]
pub struct ReplicateClient {
    http: Client,
    api_base: String,
    token: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ReplicateClient {
    /// Build a client from provider settings
    ///
    /// # Errors
    /// - [`SmileDesignError::SynthesisUnavailable`] when no API token is configured
    /// - [`SmileDesignError::Network`] when the HTTP client cannot be built
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let token = config.token().ok_or_else(|| {
            SmileDesignError::unavailable("REPLICATE_API_TOKEN is not set")
        })?;
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SmileDesignError::network_error("build HTTP client", e))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            poll_interval: config.poll_interval(),
            poll_timeout: config.poll_timeout(),
        })
    }

    /// The underlying HTTP client, for sharing with a payload resolver
    #[must_use]
    pub fn http(&self) -> Client {
        self.http.clone()
    }

    fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.api_base)
    }

    fn model_endpoint(&self, binding: &ModelBinding) -> String {
        format!("{}/models/{}/{}", self.api_base, binding.owner, binding.name)
    }

    /// Version id to run for `binding`: the pinned one, else the model's latest
    ///
    /// The model is looked up even when pinned, so a missing model fails here
    /// rather than on the first prediction.
    pub async fn resolve_version(&self, binding: &ModelBinding) -> Result<String> {
        let endpoint = self.model_endpoint(binding);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SmileDesignError::network_error(format!("model lookup {}", binding), e))?;
        let model = json_or_error("model lookup", response).await?;

        if let Some(version) = &binding.version {
            return Ok(version.clone());
        }

        model
            .get("latest_version")
            .and_then(|latest| latest.get("id"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                SmileDesignError::upstream(None, format!("model {} has no published version", binding))
            })
    }

    /// Run one prediction to completion
    ///
    /// Returns `Ok(None)` when the prediction succeeded without output.
    pub async fn predict(&self, version: &str, input: Map<String, Value>) -> Result<Option<ImagePayload>> {
        let endpoint = self.predictions_endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&json!({ "version": version, "input": input }))
            .send()
            .await
            .map_err(|e| SmileDesignError::network_error("create prediction", e))?;
        let mut prediction = json_or_error("create prediction", response).await?;

        match prediction_status(&prediction).as_str() {
            "succeeded" => {},
            "starting" | "processing" => {
                let poll_url = prediction
                    .get("urls")
                    .and_then(|urls| urls.get("get"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        SmileDesignError::upstream(None, "prediction is missing its poll URL")
                    })?;
                prediction = self.poll(&poll_url).await?;
            },
            _ => return Err(prediction_failure(&prediction)),
        }

        Ok(prediction.get("output").and_then(first_output).map(ImagePayload::Reference))
    }

    async fn poll(&self, poll_url: &str) -> Result<Value> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| SmileDesignError::network_error("poll prediction", e))?;
            let prediction = json_or_error("poll prediction", response).await?;

            match prediction_status(&prediction).as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => return Err(prediction_failure(&prediction)),
                _ => {},
            }

            if started.elapsed() >= self.poll_timeout {
                return Err(SmileDesignError::upstream(
                    None,
                    format!(
                        "prediction polling timed out after {:.1}s",
                        self.poll_timeout.as_secs_f64()
                    ),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

async fn json_or_error(context: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SmileDesignError::network_error(format!("{} response body", context), e))?;
    if !status.is_success() {
        return Err(classify_status(context, status, &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        SmileDesignError::upstream(
            Some(status.as_u16()),
            format!("{} returned invalid JSON: {}", context, e),
        )
    })
}

/// Map a non-success HTTP status onto the error taxonomy
#[must_use]
pub fn classify_status(context: &str, status: StatusCode, body: &str) -> SmileDesignError {
    let detail = truncate(body, MAX_ERROR_BODY);
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            SmileDesignError::throttled(format!("{} ({}): {}", context, status.as_u16(), detail))
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SmileDesignError::unavailable(format!(
            "{} rejected credentials ({}): {}",
            context,
            status.as_u16(),
            detail
        )),
        _ => SmileDesignError::upstream(Some(status.as_u16()), format!("{}: {}", context, detail)),
    }
}

fn prediction_status(prediction: &Value) -> String {
    prediction
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn prediction_failure(prediction: &Value) -> SmileDesignError {
    let status = prediction_status(prediction);
    let detail = prediction
        .get("error")
        .and_then(Value::as_str)
        .filter(|e| !e.trim().is_empty())
        .unwrap_or("no error detail");
    SmileDesignError::upstream(None, format!("prediction {}: {}", status, detail))
}

/// First usable output location in a prediction's `output` field
///
/// Models return a single string, a list of strings, or objects carrying a
/// `url`.
#[must_use]
pub fn first_output(output: &Value) -> Option<String> {
    match output {
        Value::String(location) => {
            let trimmed = location.trim();
            (trimmed.starts_with("http") || trimmed.starts_with("data:"))
                .then(|| trimmed.to_string())
        },
        Value::Array(items) => items.iter().find_map(first_output),
        Value::Object(fields) => fields.get("url").and_then(first_output),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Edit stage backed by an inpainting model
#[derive(Debug, Clone)]
pub struct ReplicateEditor {
    client: Arc<ReplicateClient>,
    binding: ModelBinding,
    version: String,
}

impl ReplicateEditor {
    /// Bind to one model, resolving its version
    pub async fn initialize(client: Arc<ReplicateClient>, binding: ModelBinding) -> Result<Self> {
        let version = client.resolve_version(&binding).await?;
        Ok(Self {
            client,
            binding,
            version,
        })
    }

    /// Bind to the first edit model in `config` that initializes
    pub async fn from_config(client: Arc<ReplicateClient>, config: &ProviderConfig) -> Result<Self> {
        select_binding(&config.edit_bindings, |binding| {
            Self::initialize(Arc::clone(&client), binding)
        })
        .await
    }

    #[must_use]
    pub fn binding(&self) -> &ModelBinding {
        &self.binding
    }

    /// Prediction input for `request`
    #[must_use]
    pub fn input(request: &EditRequest) -> Map<String, Value> {
        let mut input = Map::new();
        input.insert("prompt".into(), json!(request.prompt));
        input.insert("negative_prompt".into(), json!(request.negative_prompt));
        input.insert("image".into(), json!(request.image.to_input_uri()));
        input.insert("guidance_scale".into(), json!(request.guidance_strength));
        input.insert("num_inference_steps".into(), json!(request.inference_steps));
        input.insert("num_outputs".into(), json!(1));
        if let Some(mask) = &request.mask {
            input.insert("mask".into(), json!(mask.to_input_uri()));
        }
        if let Some(strength) = request.denoise_strength {
            input.insert("prompt_strength".into(), json!(strength));
        }
        input
    }
}

#[async_trait]
impl ImageEditor for ReplicateEditor {
    fn name(&self) -> String {
        self.binding.slug()
    }

    async fn edit(&self, request: &EditRequest) -> Result<Option<ImagePayload>> {
        tracing::debug!(model = %self.binding, masked = request.is_masked(), "Creating edit prediction");
        self.client.predict(&self.version, Self::input(request)).await
    }
}

/// Restoration stage backed by a face restoration model
#[derive(Debug, Clone)]
pub struct ReplicateRestorer {
    client: Arc<ReplicateClient>,
    binding: ModelBinding,
    version: String,
    fidelity: f32,
}

impl ReplicateRestorer {
    pub async fn initialize(
        client: Arc<ReplicateClient>,
        binding: ModelBinding,
        params: &RestoreParameters,
    ) -> Result<Self> {
        let version = client.resolve_version(&binding).await?;
        Ok(Self {
            client,
            binding,
            version,
            fidelity: params.fidelity,
        })
    }

    /// Bind to the first restoration model in `config` that initializes
    pub async fn from_config(
        client: Arc<ReplicateClient>,
        config: &ProviderConfig,
        params: &RestoreParameters,
    ) -> Result<Self> {
        select_binding(&config.restore_bindings, |binding| {
            Self::initialize(Arc::clone(&client), binding, params)
        })
        .await
    }

    #[must_use]
    pub fn input(&self, image: &ImagePayload) -> Map<String, Value> {
        let mut input = Map::new();
        input.insert("image".into(), json!(image.to_input_uri()));
        input.insert("codeformer_fidelity".into(), json!(self.fidelity));
        input.insert("upscale".into(), json!(1));
        input.insert("face_upsample".into(), json!(true));
        input.insert("background_enhance".into(), json!(false));
        input
    }
}

#[async_trait]
impl ImageRestorer for ReplicateRestorer {
    fn name(&self) -> String {
        self.binding.slug()
    }

    async fn restore(&self, image: &ImagePayload) -> Result<Option<ImagePayload>> {
        tracing::debug!(model = %self.binding, "Creating restoration prediction");
        self.client.predict(&self.version, self.input(image)).await
    }
}
