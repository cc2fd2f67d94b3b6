//! Error types for masking and synthesis operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for smile design operations
pub type Result<T> = std::result::Result<T, SmileDesignError>;

/// Stable classification of a failure, surfaced at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoFaceDetected,
    DimensionMismatch,
    RateLimited,
    UpstreamEmpty,
    SynthesisUnavailable,
    Upstream,
    InvalidInput,
    InvalidConfig,
    Internal,
}

impl ErrorKind {
    /// Status code used when the classification crosses an HTTP-like boundary
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::NoFaceDetected | Self::InvalidInput => 400,
            Self::RateLimited => 429,
            Self::Upstream | Self::UpstreamEmpty => 502,
            Self::SynthesisUnavailable => 503,
            Self::DimensionMismatch | Self::InvalidConfig | Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoFaceDetected => "no_face_detected",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::RateLimited => "rate_limited",
            Self::UpstreamEmpty => "upstream_empty",
            Self::SynthesisUnavailable => "synthesis_unavailable",
            Self::Upstream => "upstream",
            Self::InvalidInput => "invalid_input",
            Self::InvalidConfig => "invalid_config",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Comprehensive error types for mask extraction and synthesis
#[derive(Error, Debug)]
pub enum SmileDesignError {
    /// The landmark detector found no face in the input image
    #[error("No face detected in the input image")]
    NoFaceDetected,

    /// Blend or overwrite attempted on images of different sizes
    #[error("Dimension mismatch: expected {}, got {}", dims(.expected), dims(.actual))]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A single remote call reported a rate limit (retryable)
    #[error("Remote capability throttled the request: {0}")]
    Throttled(String),

    /// Rate limiting persisted through every allowed attempt
    #[error("Rate limited after {attempts} attempt(s): {message}")]
    RateLimited { attempts: u32, message: String },

    /// A required stage succeeded but produced no usable output
    #[error("Upstream returned no usable output: {0}")]
    UpstreamEmpty(String),

    /// No remote capability is configured or credentials are missing
    #[error("Synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    /// Remote capability failed for a reason other than rate limiting
    #[error("Upstream error{}: {message}", http_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// Transport-level failure talking to a remote capability
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed caller input (bad landmarks, empty directive, bad encoding)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or codec errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

fn dims(d: &(u32, u32)) -> String {
    format!("{}x{}", d.0, d.1)
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl SmileDesignError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new throttled error for a single remote call
    pub fn throttled<S: Into<String>>(msg: S) -> Self {
        Self::Throttled(msg.into())
    }

    /// Create a new upstream-empty error
    pub fn upstream_empty<S: Into<String>>(stage: S) -> Self {
        Self::UpstreamEmpty(stage.into())
    }

    /// Create a new synthesis-unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SynthesisUnavailable(msg.into())
    }

    /// Create a new upstream error with an optional HTTP status
    pub fn upstream<S: Into<String>>(status: Option<u16>, msg: S) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with operation context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create dimension mismatch error from two `(width, height)` pairs
    #[must_use]
    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Whether the retry policy treats this error as transient
    ///
    /// Only the rate-limit class qualifies; everything else propagates on first sight.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::RateLimited { .. })
    }

    /// Classification reported to callers
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFaceDetected => ErrorKind::NoFaceDetected,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::Throttled(_) | Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::UpstreamEmpty(_) => ErrorKind::UpstreamEmpty,
            Self::SynthesisUnavailable(_) => ErrorKind::SynthesisUnavailable,
            Self::Upstream { .. } | Self::Network(_) => ErrorKind::Upstream,
            Self::InvalidInput(_) | Self::Image(_) | Self::Serialization(_) => {
                ErrorKind::InvalidInput
            },
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
