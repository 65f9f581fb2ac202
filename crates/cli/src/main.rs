use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use cli::output;
use labeler_core::config::{self, AppConfig};
use labeler_core::ocr::OcrStatus;
use labeler_core::{assets, pipeline};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use storage::StorageProvider;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let storage = pipeline::build_storage(&cfg).await?;

    match cli.command {
        Commands::Assets { folder, json } => run_assets(storage, folder.as_deref(), json).await,
        Commands::Asset { name, folder, json } => {
            run_asset(storage, folder.as_deref(), &name, json).await
        }
        Commands::Ocr {
            name,
            rewrite,
            text,
        } => run_ocr(&cfg, storage, &name, rewrite, text).await,
        Commands::OcrAll {
            folder,
            rewrite,
            concurrency,
            json,
        } => run_ocr_all(&cfg, storage, folder.as_deref(), rewrite, concurrency, json).await,
        Commands::Ls { prefix } => {
            for key in storage.list_files(prefix.as_deref()).await? {
                println!("{}", key);
            }
            Ok(())
        }
        Commands::Cat { key } => {
            let data = storage.read_binary(&key).await?;
            std::io::stdout().write_all(&data)?;
            Ok(())
        }
        Commands::Put { file, prefix } => run_put(storage, file, prefix.as_deref()).await,
        Commands::Rm { key } => {
            storage.delete_file(&key).await?;
            info!(%key, "deleted");
            Ok(())
        }
        Commands::Exists { key } => {
            output::ensure_exists(storage.as_ref(), &key).await?;
            println!("true");
            Ok(())
        }
        Commands::Url { key } => {
            println!("{}", storage.get_url(&key).await?);
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "asset-labeler")]
#[command(about = "Asset listing and OCR for labeling datasets on S3-compatible storage", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List labelable assets with their labeling state
    Assets {
        /// Key prefix of the dataset folder
        #[arg(short, long)]
        folder: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single asset
    Asset {
        /// Storage key of the asset
        name: String,
        /// Key prefix of the dataset folder
        #[arg(short, long)]
        folder: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Recognize text of one asset, using the cached result when present
    Ocr {
        /// Storage key of the asset
        name: String,
        /// Ignore the cached result
        #[arg(long, default_value_t = false)]
        rewrite: bool,
        /// Print recognized lines instead of the JSON document
        #[arg(long, default_value_t = false)]
        text: bool,
    },
    /// Recognize text of every asset in a folder
    OcrAll {
        /// Key prefix of the dataset folder
        #[arg(short, long)]
        folder: Option<String>,
        /// Ignore cached results
        #[arg(long, default_value_t = false)]
        rewrite: bool,
        /// Assets recognized at the same time
        #[arg(long, default_value_t = pipeline::DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List object keys
    Ls {
        /// Only keys starting with this prefix
        prefix: Option<String>,
    },
    /// Write an object to stdout
    Cat { key: String },
    /// Upload a local file
    Put {
        file: PathBuf,
        /// Destination key prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Delete an object
    Rm { key: String },
    /// Check whether an object exists (exit code 1 when it does not)
    Exists { key: String },
    /// Print the URL of an object
    Url { key: String },
}

async fn run_assets(
    storage: Arc<dyn StorageProvider>,
    folder: Option<&str>,
    json: bool,
) -> Result<()> {
    let list = assets::get_assets(storage.as_ref(), folder).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else if list.is_empty() {
        println!("no assets");
    } else {
        println!("{}", output::asset_table(&list));
    }
    Ok(())
}

async fn run_asset(
    storage: Arc<dyn StorageProvider>,
    folder: Option<&str>,
    name: &str,
    json: bool,
) -> Result<()> {
    let asset = assets::get_asset(storage.as_ref(), folder, name)
        .await?
        .with_context(|| format!("no labelable asset named {name}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&asset)?);
    } else {
        println!("{}", output::asset_table(std::slice::from_ref(&asset)));
    }
    Ok(())
}

async fn run_ocr(
    cfg: &AppConfig,
    storage: Arc<dyn StorageProvider>,
    name: &str,
    rewrite: bool,
    text: bool,
) -> Result<()> {
    let service = pipeline::build_ocr_service(cfg, storage.clone())?;
    let url = storage.get_url(name).await?;
    let asset = labeler_core::models::Asset::from_file_path(&url, name);
    let on_status = |status: OcrStatus| debug!(?status, "ocr status");
    let doc = service
        .get_recognized_text(&url, name, asset.mime_type(), Some(&on_status), rewrite)
        .await?;
    if text {
        println!("{}", doc.text());
    } else {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    Ok(())
}

async fn run_ocr_all(
    cfg: &AppConfig,
    storage: Arc<dyn StorageProvider>,
    folder: Option<&str>,
    rewrite: bool,
    concurrency: usize,
    json: bool,
) -> Result<()> {
    let service = pipeline::build_ocr_service(cfg, storage.clone())?;
    let outcomes =
        pipeline::recognize_folder(&service, storage.as_ref(), folder, rewrite, concurrency)
            .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        println!("{}", output::outcome_lines(&outcomes));
    }
    if outcomes.iter().any(|o| !o.ok) {
        anyhow::bail!("some assets could not be recognized");
    }
    Ok(())
}

async fn run_put(
    storage: Arc<dyn StorageProvider>,
    file: PathBuf,
    prefix: Option<&str>,
) -> Result<()> {
    let key = output::upload_key(&file, prefix)
        .with_context(|| format!("not a file path: {}", file.display()))?;
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("read {}", file.display()))?;
    storage.write_binary(&key, Bytes::from(data)).await?;
    println!("{}", storage.get_url(&key).await?);
    Ok(())
}
