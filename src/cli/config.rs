//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, GenerateArgs, MaskGeometryArgs};
use crate::config::{ModelBinding, SmileDesignConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a [`SmileDesignConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Layer CLI flags over `--config` (or the environment defaults)
    pub(crate) fn from_cli(
        cli: &Cli,
        geometry: &MaskGeometryArgs,
        generate: Option<&GenerateArgs>,
    ) -> Result<SmileDesignConfig> {
        let mut config = match &cli.config {
            Some(path) => SmileDesignConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
                .with_env_overrides(),
            None => SmileDesignConfig::from_env().context("Failed to load configuration")?,
        };

        if let Some(dilation) = geometry.dilation {
            config.mask.dilation_size = dilation;
        }
        if let Some(blur) = geometry.blur {
            config.mask.blur_kernel_size = blur;
        }

        if let Some(args) = generate {
            if !args.edit_models.is_empty() {
                config.provider.edit_bindings = args
                    .edit_models
                    .iter()
                    .map(|spec| {
                        ModelBinding::parse(spec)
                            .with_context(|| format!("Invalid --edit-model '{}'", spec))
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
            if args.no_restore {
                config.synthesis.restore.enabled = false;
            }
        }

        config.validate().context("Invalid configuration")?;
        log::debug!(
            "CLI configuration: dilation={} blur={} edit_models={} restore={}",
            config.mask.dilation_size,
            config.mask.blur_kernel_size,
            config.provider.edit_bindings.len(),
            config.synthesis.restore.enabled
        );
        Ok(config)
    }
}
