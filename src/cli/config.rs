//! Conversion of CLI arguments into pipeline configuration

use crate::background::BackgroundSpec;
use crate::cli::main_impl::{Cli, CliBackend, CliCutoutFormat, CliExecutionProvider, CliOutputFormat};
use crate::{
    config::{BackendType, ExecutionProvider, OutputFormat, PipelineConfig},
    models::ModelSource,
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `PipelineConfig` from a config file (if given) overlaid with flags
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(model_arg) = &cli.model {
            config.model_spec.source = ModelSource::parse(model_arg);
        }
        if let Some(resolution) = cli.resolution {
            config.model_spec.resolution = resolution;
        }
        if let Some(backend) = cli.backend {
            config.backend_type = match backend {
                CliBackend::Onnx => BackendType::Onnx,
                CliBackend::Tract => BackendType::Tract,
            };
        }
        if let Some(provider) = cli.execution_provider {
            config.execution_provider = match provider {
                CliExecutionProvider::Auto => ExecutionProvider::Auto,
                CliExecutionProvider::Cpu => ExecutionProvider::Cpu,
                CliExecutionProvider::Cuda => ExecutionProvider::Cuda,
                CliExecutionProvider::Coreml => ExecutionProvider::CoreMl,
            };
        }

        config.cutout_format = match cli.cutout_format {
            CliCutoutFormat::Png => OutputFormat::Png,
            CliCutoutFormat::Webp => OutputFormat::WebP,
        };
        config.recomposite_format = match cli.format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
        };
        config.jpeg_quality = cli.jpeg_quality;

        if cli.threads > 0 {
            config.intra_threads = cli.threads;
            config.inter_threads = (cli.threads / 2).max(1);
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Parse `--background`
    pub(crate) fn background(cli: &Cli) -> Result<BackgroundSpec> {
        cli.background
            .parse::<BackgroundSpec>()
            .with_context(|| format!("Invalid --background '{}'", cli.background))
    }
}
