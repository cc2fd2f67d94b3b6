//! Tracing configuration module for structured logging and observability
//!
//! Applications configure the subscriber; library code only emits events and
//! spans. The `spans` and `events` helpers keep field names consistent
//! between the CLI and the library.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output without ANSI colors, for CI logs
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

impl TracingFormat {
    /// Format for the CLI `--json` flag
    ///
    /// The second value is true when JSON was requested but this build lacks
    /// the `tracing-json` feature and falls back to console output.
    pub fn for_cli(json: bool) -> (Self, bool) {
        #[cfg(feature = "tracing-json")]
        {
            if json {
                (Self::Json, false)
            } else {
                (Self::Console, false)
            }
        }
        #[cfg(not(feature = "tracing-json"))]
        {
            (Self::Console, json)
        }
    }
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for request correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    ///
    /// Dependencies stay at `warn` so HTTP internals do not drown the output.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,smile_design=info",
            1 => "warn,smile_design=debug",
            _ => "info,smile_design=trace",
        }
    }

    /// Initialize the global subscriber
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(env_filter) => EnvFilter::try_new(env_filter)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Smile design session started");
        }
        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults
///
/// Returns the session id attached to this run.
pub fn init_cli_tracing(verbosity: u8, json: bool) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let (format, json_unavailable) = TracingFormat::for_cli(json);

    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone());
    if let Ok(filter) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(filter);
    }
    config.init()?;
    if json_unavailable {
        tracing::warn!("JSON logging requires the tracing-json feature");
    }
    Ok(session_id)
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for one CLI invocation
    pub fn session(session_id: &str, command: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            command = %command
        )
    }

    /// Span for mask extraction of one file
    pub fn mask_extraction(file_path: &std::path::Path, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::INFO,
            "mask_extraction",
            file_path = %file_path.display(),
            width = %dimensions.0,
            height = %dimensions.1
        )
    }

    /// Span for one generation request
    pub fn generation(owner_id: &str, masked: bool) -> Span {
        tracing::span!(
            Level::INFO,
            "generation",
            owner_id = %owner_id,
            masked = %masked
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{info, warn};

    /// Log a user-facing progress update
    pub fn progress(message: &str) {
        info!("{}", message);
    }

    /// Log a warning with recommendation
    pub fn warning_with_recommendation(message: &str, recommendation: &str) {
        warn!(message = %message, recommendation = %recommendation, "Warning");
    }

    /// Log how long a stage took
    pub fn stage_timing(stage: &str, duration_ms: u64) {
        info!(stage = %stage, duration_ms = %duration_ms, "Stage timing");
    }
}
