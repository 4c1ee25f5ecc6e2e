//! bannerkit command line
//!
//! `serve` runs the proxy server; the other commands drive the library
//! directly against the configured storage, catalog and model cache.

use super::config::CliConfigBuilder;
use crate::catalog::{
    AssetFile, BannerDraft, PartnerAssets, PartnerDraft, PartnerStatus, PartnerUpdate,
};
use crate::config::AppConfig;
use crate::removal::models::ProgressIndicator;
use crate::removal::{ModelPrecision, ModelStore};
use crate::tracing_config::{init_cli_tracing, spans, TracingFormat};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::Instrument;
use uuid::Uuid;

/// Marketing banner backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bannerkit")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliPrecision {
    Fp32,
    Fp16,
    Quantized,
}

impl From<CliPrecision> for ModelPrecision {
    fn from(precision: CliPrecision) -> Self {
        match precision {
            CliPrecision::Fp32 => Self::Full,
            CliPrecision::Fp16 => Self::Fp16,
            CliPrecision::Quantized => Self::Quantized,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the image proxy and BFL relay server
    Serve {
        /// Listen address, overrides the config file
        #[arg(long)]
        bind: Option<String>,
    },
    /// Store a remote image durably, falling back through proxies
    Resolve {
        url: String,
        /// Object key (default: banners/<uuid>.png)
        #[arg(long)]
        key: Option<String>,
        /// Target bucket (default: storage.default_bucket)
        #[arg(long)]
        bucket: Option<String>,
        /// Print the full attempt trail as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the background from a product photo
    RemoveBg {
        input: PathBuf,
        /// Output file (default: <input>-nobg.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Ignore any GPU execution provider
        #[arg(long)]
        cpu: bool,
    },
    /// Download model variants into the cache
    FetchModel {
        /// Variant to fetch (default: all)
        #[arg(long, value_enum)]
        precision: Option<CliPrecision>,
        /// List cached variants and exit
        #[arg(long)]
        list: bool,
    },
    /// Manage partners
    Partners {
        #[command(subcommand)]
        action: PartnerCommand,
    },
    /// Manage generated banners
    Banners {
        #[command(subcommand)]
        action: BannerCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PartnerCommand {
    List,
    Show {
        id: Uuid,
    },
    Create {
        name: String,
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long)]
        benefits: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "draft")]
        status: PartnerStatus,
        #[arg(long)]
        logo: Option<PathBuf>,
        #[arg(long)]
        brand_manual: Option<PathBuf>,
        #[arg(long = "reference-banner")]
        reference_banners: Vec<PathBuf>,
        #[arg(long = "product-photo")]
        product_photos: Vec<PathBuf>,
    },
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "region")]
        regions: Option<Vec<String>>,
        #[arg(long)]
        benefits: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<PartnerStatus>,
    },
    /// Delete a partner and all of its banners
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum BannerCommand {
    List {
        #[arg(long)]
        partner: Uuid,
    },
    /// Store a generated banner image and record it
    Record {
        #[arg(long)]
        partner: Uuid,
        #[arg(long)]
        image_url: String,
        #[arg(long, default_value = "")]
        prompt: String,
        #[arg(long, default_value = "")]
        main_text: String,
        #[arg(long, default_value = "")]
        description_text: String,
        #[arg(long, default_value = "")]
        cta_text: String,
        #[arg(long)]
        discount: Option<u8>,
        #[arg(long)]
        bucket: Option<String>,
    },
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose, cli.log_format.into()).context("Failed to initialize tracing")?;

    let bind = match &cli.command {
        Command::Serve { bind } => bind.as_deref(),
        _ => None,
    };
    let config = CliConfigBuilder::load(cli.config.as_deref(), bind)?;

    match cli.command {
        Command::Serve { .. } => crate::proxy::serve(&config)
            .instrument(spans::command("serve"))
            .await
            .context("Server failed"),
        Command::Resolve {
            url,
            key,
            bucket,
            json,
        } => {
            let bucket = bucket.unwrap_or_else(|| config.storage.default_bucket.clone());
            let span = spans::resolve(&url, &bucket);
            resolve(&config, &url, key, &bucket, json).instrument(span).await
        },
        Command::RemoveBg { input, output, cpu } => {
            let span = spans::removal(&input);
            remove_background(&config, &input, output, cpu)
                .instrument(span)
                .await
        },
        Command::FetchModel { precision, list } => fetch_models(&config, precision, list).await,
        Command::Partners { action } => partners(&config, action).await,
        Command::Banners { action } => banners(&config, action).await,
    }
}

async fn resolve(
    config: &AppConfig,
    url: &str,
    key: Option<String>,
    bucket: &str,
    json: bool,
) -> Result<()> {
    let storage = CliConfigBuilder::storage(config).await?;
    let resolver = CliConfigBuilder::resolver(config, storage)?;
    let key = key.unwrap_or_else(|| format!("banners/{}.png", Uuid::new_v4()));

    let resolved = resolver
        .resolve(url, &key, bucket)
        .await
        .context("Failed to resolve image")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }
    for attempt in &resolved.attempts {
        let status = if attempt.succeeded { "ok" } else { "failed" };
        match &attempt.error {
            Some(error) => println!("  {:<16} {:<6} {}", attempt.strategy.to_string(), status, error),
            None => println!("  {:<16} {}", attempt.strategy.to_string(), status),
        }
    }
    if !resolved.is_stored() {
        tracing::warn!("no strategy produced a usable image; keeping the original URL");
    }
    println!("{}", resolved.url);
    Ok(())
}

fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}-nobg.{}", stem, extension))
}

#[cfg(feature = "onnx")]
async fn remove_background(
    config: &AppConfig,
    input: &Path,
    output: Option<PathBuf>,
    cpu: bool,
) -> Result<()> {
    use crate::removal::{ComputeCapabilities, InputImage, ObjectUrlRegistry, OnnxRemover, RemovalPipeline};
    use std::sync::Arc;

    let image = InputImage::from_path(input).await?;
    let capabilities = if cpu {
        ComputeCapabilities::cpu_only()
    } else {
        ComputeCapabilities::detect()
    };
    let store = ModelStore::new(&config.models).context("Failed to open model cache")?;
    let registry = ObjectUrlRegistry::new();
    let pipeline = RemovalPipeline::new(
        Arc::new(OnnxRemover::new(store)),
        capabilities,
        config.removal,
        registry.clone(),
    );

    let outcome = pipeline
        .remove_background(image)
        .await
        .context("Background removal failed")?;
    let output = output
        .unwrap_or_else(|| default_output_path(input, outcome.config.output_format.extension()));
    tokio::fs::write(&output, &outcome.result_bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    for failure in &outcome.failures {
        tracing::info!(%failure, "attempt failed before success");
    }
    tracing::info!(
        tier = %outcome.tier,
        config = %outcome.config,
        original = outcome.original_size,
        processed = outcome.processed_size,
        "background removed"
    );
    println!("{}", output.display());
    registry.revoke_all();
    Ok(())
}

#[cfg(not(feature = "onnx"))]
async fn remove_background(
    _config: &AppConfig,
    _input: &Path,
    _output: Option<PathBuf>,
    _cpu: bool,
) -> Result<()> {
    anyhow::bail!("Background removal needs the `onnx` feature")
}

async fn fetch_models(config: &AppConfig, precision: Option<CliPrecision>, list: bool) -> Result<()> {
    let store = ModelStore::new(&config.models).context("Failed to open model cache")?;

    if list {
        println!("Cache directory: {}", store.cache_dir().display());
        let cached = store.cached_models();
        if cached.is_empty() {
            println!("No cached models");
        }
        for model in cached {
            println!(
                "  {:<10} {:>8.1} MB  {}",
                model.precision.to_string(),
                model.size_bytes as f64 / (1024.0 * 1024.0),
                model.path.display()
            );
        }
        return Ok(());
    }

    let precisions = match precision {
        Some(p) => vec![ModelPrecision::from(p)],
        None => vec![ModelPrecision::Full, ModelPrecision::Fp16, ModelPrecision::Quantized],
    };
    for precision in precisions {
        let progress = ProgressIndicator::bar();
        let path = store
            .download(precision, Some(&progress))
            .instrument(spans::model_download(&precision.to_string()))
            .await
            .with_context(|| format!("Failed to download {} model", precision))?;
        println!("{} -> {}", precision, path.display());
    }
    Ok(())
}

async fn read_asset(path: &Path) -> Result<AssetFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(AssetFile::new(name, bytes))
}

async fn read_assets(paths: &[PathBuf]) -> Result<Vec<AssetFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_asset(path).await?);
    }
    Ok(files)
}

async fn partners(config: &AppConfig, action: PartnerCommand) -> Result<()> {
    let service = CliConfigBuilder::catalog(config).await?;

    match action {
        PartnerCommand::List => {
            for partner in service.partners().await? {
                println!("{}  {:<8} {}", partner.id, partner.status.to_string(), partner.name);
            }
        },
        PartnerCommand::Show { id } => {
            let partner = service.partner(id).await?;
            println!("{}", serde_json::to_string_pretty(&partner)?);
        },
        PartnerCommand::Create {
            name,
            regions,
            benefits,
            description,
            status,
            logo,
            brand_manual,
            reference_banners,
            product_photos,
        } => {
            let assets = PartnerAssets {
                logo: match logo {
                    Some(path) => Some(read_asset(&path).await?),
                    None => None,
                },
                brand_manual: match brand_manual {
                    Some(path) => Some(read_asset(&path).await?),
                    None => None,
                },
                reference_banners: read_assets(&reference_banners).await?,
                product_photos: read_assets(&product_photos).await?,
            };
            let draft = PartnerDraft {
                name,
                regions,
                benefits,
                description,
                status,
            };
            let created = service.create_partner(draft, assets).await?;
            for upload in created.failed_uploads() {
                if let Err(e) = &upload.result {
                    eprintln!("upload failed: {} #{} ({}): {}", upload.slot, upload.index, upload.file_name, e);
                }
            }
            println!("{}", created.partner.id);
        },
        PartnerCommand::Update {
            id,
            name,
            regions,
            benefits,
            description,
            status,
        } => {
            let update = PartnerUpdate {
                name,
                regions,
                benefits,
                description,
                status,
                ..PartnerUpdate::default()
            };
            let partner = service.update_partner(id, update).await?;
            println!("{}", serde_json::to_string_pretty(&partner)?);
        },
        PartnerCommand::Delete { id } => {
            service.delete_partner(id).await?;
            println!("deleted {}", id);
        },
    }
    Ok(())
}

async fn banners(config: &AppConfig, action: BannerCommand) -> Result<()> {
    let service = CliConfigBuilder::catalog(config).await?;

    match action {
        BannerCommand::List { partner } => {
            for banner in service.banners_for(partner).await? {
                println!("{}  {}  {}", banner.id, banner.created_at.to_rfc3339(), banner.image_url);
            }
        },
        BannerCommand::Record {
            partner,
            image_url,
            prompt,
            main_text,
            description_text,
            cta_text,
            discount,
            bucket,
        } => {
            let bucket = bucket.unwrap_or_else(|| config.storage.default_bucket.clone());
            let draft = BannerDraft {
                partner_id: partner,
                image_url,
                prompt,
                main_text,
                description_text,
                cta_text,
                discount_percentage: discount,
            };
            let recorded = service.record_banner(draft, &bucket).await?;
            if !recorded.resolution.is_stored() {
                tracing::warn!("banner image could not be stored; recorded the generator URL");
            }
            println!("{}  {}", recorded.banner.id, recorded.banner.image_url);
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_partner_create() {
        let cli = Cli::try_parse_from([
            "bannerkit",
            "-vv",
            "partners",
            "create",
            "Acme",
            "--region",
            "EU",
            "--region",
            "US",
            "--status",
            "active",
            "--product-photo",
            "a.png",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Partners {
                action:
                    PartnerCommand::Create {
                        name,
                        regions,
                        status,
                        product_photos,
                        ..
                    },
            } => {
                assert_eq!(name, "Acme");
                assert_eq!(regions, vec!["EU", "US"]);
                assert_eq!(status, PartnerStatus::Active);
                assert_eq!(product_photos, vec![PathBuf::from("a.png")]);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_and_global_config() {
        let cli = Cli::try_parse_from(["bannerkit", "serve", "--bind", "0.0.0.0:80", "--config", "c.json"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        assert!(matches!(cli.command, Command::Serve { bind: Some(ref b) } if b == "0.0.0.0:80"));
    }

    #[test]
    fn test_discount_must_fit_u8() {
        let partner = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from([
            "bannerkit",
            "banners",
            "record",
            "--partner",
            partner.as_str(),
            "--image-url",
            "https://x/a.png",
            "--discount",
            "300",
        ])
        .is_err());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/shoe.jpg"), "png"),
            PathBuf::from("/tmp/shoe-nobg.png")
        );
    }
}
