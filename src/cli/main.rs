//! Background swap CLI
//!
//! Every input yields `<stem>_cutout.<ext>` and `<stem>_<background>.<ext>`.
//! All inputs share one pipeline, so the model is loaded once.

use super::config::CliConfigBuilder;
use crate::{
    background::BackgroundSpec,
    backends::provider_diagnostics,
    cache::{format_size, ModelCache},
    config::PipelineConfig,
    download::{validate_model_url, ModelDownloader},
    models::ModelSource,
    pipeline::Pipeline,
    provider::{ModelProvider, RemoteModelLoader},
    relay::RelayResponse,
    services::{ConsoleProgressReporter, OutputFormatHandler},
    types::ProcessOutput,
    BgSwapError,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Cut out a photo's subject and place it on a solid background
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgswap")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required_unless_present_any = &["relay", "show_providers", "only_download", "clear_cache", "show_cache_dir"])]
    pub input: Vec<String>,

    /// Background: red, green, blue, white, black or #RRGGBB
    #[arg(short, long, default_value = "white")]
    pub background: String,

    /// Encoding of the transparent cutout
    #[arg(long, value_enum, default_value_t = CliCutoutFormat::Png)]
    pub cutout_format: CliCutoutFormat,

    /// Encoding of the recomposited image
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 90)]
    pub jpeg_quality: u8,

    /// Output directory [default: next to each input]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Model URL or path to a local ONNX file
    #[arg(short, long)]
    pub model: Option<String>,

    /// Square input resolution of the model
    #[arg(long)]
    pub resolution: Option<u32>,

    #[arg(long, value_enum)]
    pub backend: Option<CliBackend>,

    #[arg(short, long, value_enum)]
    pub execution_provider: Option<CliExecutionProvider>,

    /// Number of inference threads (0 = backend default)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Images processed concurrently
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Process a relay response (`{"originalImage": ..., "bgColor": [r, g, b]}`)
    #[arg(long, value_name = "FILE")]
    pub relay: Option<PathBuf>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Show backend and execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Download the model into the cache and exit
    #[arg(long)]
    pub only_download: bool,

    /// Remove cached models and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Print the cache directory and cached models, then exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Use a custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliCutoutFormat {
    Png,
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Onnx,
    Tract,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExecutionProvider {
    Auto,
    Cpu,
    Cuda,
    Coreml,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing = crate::tracing_config::init_cli_tracing(cli.verbose)
        .context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli)?;

    if cli.show_cache_dir {
        return show_cache_dir(&config);
    }
    if cli.clear_cache {
        return clear_cache(&config);
    }
    if cli.only_download {
        return download_only(&config).await;
    }

    let background = CliConfigBuilder::background(&cli)?;
    OutputFormatHandler::warn_if_opaque_only(config.recomposite_format);

    let loader = RemoteModelLoader::new(config.clone()).with_progress(true);
    let provider = Arc::new(ModelProvider::new(Arc::new(loader)));
    let pipeline = Pipeline::with_provider(config, provider)
        .context("Failed to create pipeline")?
        .with_reporter(Arc::new(ConsoleProgressReporter::new(cli.verbose > 0)));

    let start_time = Instant::now();
    let processed = if let Some(relay_path) = &cli.relay {
        process_relay(&cli, &pipeline, relay_path).await?
    } else {
        process_inputs(&cli, &pipeline, &background).await?
    };

    info!(
        "Processed {} image(s) in {:.2}s",
        processed,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let diagnostics = provider_diagnostics();
    if diagnostics.is_empty() {
        println!("   No inference backend is compiled into this build.");
    }
    for (backend, providers) in diagnostics {
        println!("\n🔧 {backend}:");
        for (name, available, description) in providers {
            let status = if available { "✅ Available" } else { "❌ Not Available" };
            println!("   • {name}: {status} - {description}");
        }
    }

    println!("\n💡 Select with --backend onnx|tract and --execution-provider auto|cpu|cuda|coreml");
}

fn show_cache_dir(config: &PipelineConfig) -> Result<()> {
    let cache = ModelCache::from_config(config).context("Failed to access model cache")?;
    println!("📁 Cache directory: {}", cache.cache_dir().display());
    if std::env::var(crate::config::CACHE_DIR_ENV).is_ok() {
        println!("   Source: {} environment variable", crate::config::CACHE_DIR_ENV);
    }

    let models = cache.list().context("Failed to list cached models")?;
    if models.is_empty() {
        println!("   No cached models.");
    }
    for model in models {
        println!("   • {} ({})", model.model_id, format_size(model.size_bytes));
    }
    Ok(())
}

fn clear_cache(config: &PipelineConfig) -> Result<()> {
    let cache = ModelCache::from_config(config).context("Failed to access model cache")?;
    let removed = cache.clear().context("Failed to clear cache")?;
    if removed.is_empty() {
        println!("💡 Cache was already empty");
    } else {
        println!("🗑️  Removed {} model(s):", removed.len());
        for model_id in &removed {
            println!("   • {}", model_id);
        }
    }
    Ok(())
}

async fn download_only(config: &PipelineConfig) -> Result<()> {
    let ModelSource::Url(url) = &config.model_spec.source else {
        anyhow::bail!("--only-download requires a model URL; local files need no download");
    };
    validate_model_url(url).context("Invalid model URL")?;

    let downloader = ModelDownloader::new(config).context("Failed to create model downloader")?;
    let path = downloader
        .fetch(url, true)
        .await
        .context("Failed to download model")?;
    println!("✅ Model available at {}", path.display());
    Ok(())
}

async fn process_relay(cli: &Cli, pipeline: &Pipeline, relay_path: &Path) -> Result<usize> {
    let body = std::fs::read_to_string(relay_path)
        .with_context(|| format!("Failed to read relay response {}", relay_path.display()))?;
    let response = RelayResponse::from_json(&body)?;

    let output = pipeline
        .process_relay_response(&response)
        .await
        .map_err(user_facing)?;

    let background = BackgroundSpec::Rgb(output.background);
    let dir = output_dir_for(cli, relay_path)?;
    let stem = file_stem(relay_path);
    write_outputs(&output, &dir, &stem, &background)?;
    Ok(1)
}

async fn process_inputs(
    cli: &Cli,
    pipeline: &Pipeline,
    background: &BackgroundSpec,
) -> Result<usize> {
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli, pipeline, background).await;
    }

    let mut files = Vec::new();
    for input in &cli.input {
        let path = PathBuf::from(input);
        if path.is_file() {
            if is_image_file(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }
    files.sort();
    info!("Found {} image file(s) to process", files.len());

    // Load up front so a model failure aborts once instead of per file
    pipeline
        .warm_up()
        .await
        .map_err(user_facing)
        .context("Failed to load segmentation model")?;

    let progress = (files.len() > 1).then(|| {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    });

    let batch_span = crate::tracing_config::spans::batch_processing(files.len());
    let label = background.label();
    let results: Vec<(PathBuf, Result<()>)> = stream::iter(files)
        .map(|path| {
            let span = crate::tracing_config::spans::file_processing(&path, &label);
            let progress = progress.clone();
            async move {
                let result = process_file(cli, pipeline, &path, background).await;
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                (path, result)
            }
            .instrument(span)
        })
        .buffer_unordered(cli.jobs.max(1))
        .collect()
        .instrument(batch_span)
        .await;

    let mut processed = 0;
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(()) => processed += 1,
            Err(e) => {
                error!("❌ Failed to process {}: {:#}", path.display(), e);
                failed += 1;
            },
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Processed: {processed}, Failed: {failed}"));
    }
    if failed > 0 && processed == 0 {
        anyhow::bail!("All {} input(s) failed", failed);
    }
    if failed > 0 {
        warn!("Some files failed to process. Processed: {processed}, Failed: {failed}");
    }
    Ok(processed)
}

async fn process_file(
    cli: &Cli,
    pipeline: &Pipeline,
    path: &Path,
    background: &BackgroundSpec,
) -> Result<()> {
    let output = pipeline
        .process_file(path, background)
        .await
        .map_err(user_facing)?;
    let dir = output_dir_for(cli, path)?;
    write_outputs(&output, &dir, &file_stem(path), background)?;
    Ok(())
}

async fn process_stdin(
    cli: &Cli,
    pipeline: &Pipeline,
    background: &BackgroundSpec,
) -> Result<usize> {
    info!("Reading image from stdin");
    let mut raw = Vec::new();
    std::io::stdin()
        .read_to_end(&mut raw)
        .context("Failed to read image data from stdin")?;

    let output = pipeline
        .process_image(&raw, background)
        .await
        .map_err(user_facing)?;
    let dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    write_outputs(&output, &dir, "stdin", background)?;
    Ok(1)
}

/// Attach the end-user message while keeping the technical detail in the chain
fn user_facing(error: BgSwapError) -> anyhow::Error {
    let message = error.user_message();
    anyhow::Error::new(error).context(message)
}

fn output_dir_for(cli: &Cli, input: &Path) -> Result<PathBuf> {
    match &cli.output {
        Some(dir) => {
            if dir.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    dir.display()
                );
            }
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
            Ok(dir.clone())
        },
        None => Ok(input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)),
    }
}

fn write_outputs(
    output: &ProcessOutput,
    dir: &Path,
    stem: &str,
    background: &BackgroundSpec,
) -> Result<(PathBuf, PathBuf)> {
    let (cutout_path, recomposited_path) = output_paths(
        dir,
        stem,
        background,
        output.cutout.format.extension(),
        output.recomposited.format.extension(),
    );

    output
        .cutout
        .save(&cutout_path)
        .with_context(|| format!("Failed to write {}", cutout_path.display()))?;
    output
        .recomposited
        .save(&recomposited_path)
        .with_context(|| format!("Failed to write {}", recomposited_path.display()))?;

    info!(
        "💾 {} + {} ({}x{}, {})",
        cutout_path.display(),
        recomposited_path.display(),
        output.dimensions.0,
        output.dimensions.1,
        output.timings.summary()
    );
    Ok((cutout_path, recomposited_path))
}

fn output_paths(
    dir: &Path,
    stem: &str,
    background: &BackgroundSpec,
    cutout_ext: &str,
    recomposited_ext: &str,
) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{stem}_cutout.{cutout_ext}")),
        dir.join(format!("{stem}_{}.{recomposited_ext}", background.label())),
    )
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned())
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file() && is_image_file(path) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && is_image_file(&path) && matches_pattern(&path, pattern)
            {
                files.push(path);
            }
        }
    }

    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| glob::Pattern::new(pat).is_ok_and(|p| p.matches(name))),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_output_paths() {
        let (cutout, recomposited) = output_paths(
            Path::new("out"),
            "portrait",
            &BackgroundSpec::Custom("#00FF7f".into()),
            "png",
            "jpg",
        );
        assert_eq!(cutout, PathBuf::from("out/portrait_cutout.png"));
        assert_eq!(recomposited, PathBuf::from("out/portrait_00ff7f.jpg"));

        let (_, recomposited) = output_paths(
            Path::new("."),
            "cat",
            &BackgroundSpec::default(),
            "png",
            "webp",
        );
        assert_eq!(recomposited, PathBuf::from("./cat_white.webp"));
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.JPG")));
        assert!(is_image_file(Path::new("dir/b.tif")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern(Path::new("x/photo.jpg"), Some("*.jpg")));
        assert!(!matches_pattern(Path::new("x/photo.png"), Some("*.jpg")));
        assert!(matches_pattern(Path::new("x/photo.png"), None));
        assert!(!matches_pattern(Path::new("x/photo.png"), Some("[")));
    }

    #[test]
    fn test_find_image_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(dir.path().join("c.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/d.png"), b"x").unwrap();

        let flat = find_image_files(dir.path(), false, None).unwrap();
        assert_eq!(flat.len(), 2);

        let mut deep = find_image_files(dir.path(), true, Some("*.png")).unwrap();
        deep.sort();
        assert_eq!(deep.len(), 2);
        assert!(deep.iter().all(|p| p.extension().unwrap() == "png"));
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["bgswap"]).is_err());
        assert!(Cli::try_parse_from(["bgswap", "--show-cache-dir"]).is_ok());
        assert!(Cli::try_parse_from(["bgswap", "--show-providers"]).is_ok());
        assert!(Cli::try_parse_from(["bgswap", "--relay", "r.json"]).is_ok());
    }
}
