//! heic-convert CLI - Memory-bounded image to JPEG conversion
//!
//! Converts a single image reference (cache name, path, `file://` or remote
//! URL) into a JPEG written to the cache directory.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing::debug;

use heic_convert::{
    init_with_config, ConvertRequest, Converter, ConverterConfig, DEFAULT_QUALITY,
};

/// heic-convert - Memory-bounded image to JPEG conversion
#[derive(Parser)]
#[command(
    name = "heic-convert",
    version,
    about = "Convert HEIC and other raster images to JPEG",
    long_about = "heic-convert resolves an image reference through the local caches, direct \
                  paths or a remote download, then decodes it under a memory ceiling, applies \
                  EXIF orientation, optionally downscales it to a bound and writes a JPEG."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (.toml or .yaml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Convert one image reference to JPEG
    Convert {
        /// Cache name, path, file:// URL or http(s) URL
        reference: String,

        /// JPEG quality (0-100)
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_QUALITY,
            value_parser = clap::value_parser!(u8).range(0..=100)
        )]
        quality: u8,

        /// Maximum output dimension in pixels (0 = no resizing)
        #[arg(short, long, default_value_t = 0, value_name = "PIXELS")]
        bound: u32,

        /// Primary cache directory
        #[arg(long, env = "HEIC_CONVERT_CACHE_DIR", value_name = "DIR")]
        cache_dir: Option<PathBuf>,

        /// Secondary (external) cache directory
        #[arg(long, value_name = "DIR")]
        external_cache_dir: Option<PathBuf>,

        /// Directory for converted output (defaults to the primary cache)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Per-request memory ceiling in bytes
        #[arg(long, value_name = "BYTES")]
        memory_limit: Option<u64>,

        /// Print the artifact as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report whether the decoder handles HEIC/HEIF
    CheckSupport,
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, default_value = "heic-convert.toml")]
        output: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ConverterConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConverterConfig::default(),
    };

    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    match cli.command {
        Commands::Convert {
            reference,
            quality,
            bound,
            cache_dir,
            external_cache_dir,
            output_dir,
            memory_limit,
            json,
        } => {
            if let Some(dir) = cache_dir {
                config.cache.primary_dir = dir;
            }
            if external_cache_dir.is_some() {
                config.cache.external_dir = external_cache_dir;
            }
            if output_dir.is_some() {
                config.cache.output_dir = output_dir;
            }
            if memory_limit.is_some() {
                config.memory.limit_bytes = memory_limit;
            }

            init_with_config(&config.logging)?;
            let request = ConvertRequest::new(reference).quality(quality).bound(bound);
            convert(config, &request, json).await
        }
        Commands::CheckSupport => {
            init_with_config(&config.logging)?;
            check_support(config)
        }
        Commands::ExampleConfig { output, yaml } => generate_example_config(&output, yaml),
        Commands::ValidateConfig { file } => validate_config_file(&file),
    }
}

/// Run one conversion and report the artifact
async fn convert(config: ConverterConfig, request: &ConvertRequest, json: bool) -> Result<()> {
    let converter = Converter::new(config)?;
    debug!("Cache directory: {:?}", converter.config().cache.primary_dir);

    let artifact = match converter.convert(request).await {
        Ok(artifact) => artifact,
        Err(e) if json => {
            let report = serde_json::json!({
                "error": e.kind().as_str(),
                "message": e.user_message(),
                "detail": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            process::exit(1);
        }
        Err(e) => anyhow::bail!("{} [{}]", e.user_message(), e.kind()),
    };

    if json {
        let mut report = serde_json::to_value(&artifact)?;
        report["reference"] = serde_json::Value::String(artifact.reference());
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", artifact.reference());
    eprintln!(
        "{}: {}x{}, {:.2}KB",
        style("Converted").green().bold(),
        artifact.width,
        artifact.height,
        artifact.file_size as f64 / 1024.0
    );
    for degradation in &artifact.degradations {
        eprintln!("{}: {}", style("Degraded").yellow().bold(), degradation);
    }

    Ok(())
}

/// Report decoder capability
fn check_support(config: ConverterConfig) -> Result<()> {
    let converter = Converter::new(config)?;
    if converter.check_support() {
        println!("{}: HEIC/HEIF decoding is supported", style("Supported").green().bold());
    } else {
        println!(
            "{}: HEIC/HEIF decoding is not supported by this build",
            style("Unsupported").yellow().bold()
        );
    }
    Ok(())
}

/// Validate configuration file
fn validate_config_file(file_path: &Path) -> Result<()> {
    let config = ConverterConfig::from_file(file_path)?;
    config.validate()?;
    println!("{}: Configuration file is valid", style("Success").green().bold());
    println!("Primary cache: {}", config.cache.primary_dir.display());
    if let Some(external) = &config.cache.external_dir {
        println!("External cache: {}", external.display());
    }
    Ok(())
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path, use_yaml: bool) -> Result<()> {
    let mut output_path = output_path.to_path_buf();
    let has_yaml_extension = matches!(
        output_path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    if use_yaml && !has_yaml_extension {
        output_path.set_extension("yaml");
    }

    let config = ConverterConfig::default();
    config.to_file(&output_path)?;

    let format = if use_yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        format,
        output_path.display()
    );
    Ok(())
}
