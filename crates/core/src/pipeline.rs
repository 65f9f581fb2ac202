use crate::assets::get_assets;
use crate::config::AppConfig;
use crate::models::Asset;
use crate::ocr::{OcrService, OcrSettings};
use anyhow::Context;
use futures::stream::{self, StreamExt};
use providers::http::{ApiFlavor, HttpOcrConfig, HttpOcrProvider};
use providers::noop::NoopProvider;
use providers::ProviderRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use storage::{MemoryStorage, StorageProvider};
use tracing::{info, warn};

/// Number of assets recognized at the same time by [`recognize_folder`].
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct RecognitionOutcome {
    pub asset: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub lines: usize,
}

pub async fn build_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn StorageProvider>> {
    match config.storage.provider.as_str() {
        "s3" | "minio" => {
            let s3 = storage::connect(config.storage.s3.clone())
                .await
                .context("storage connect")?;
            Ok(Arc::new(s3))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        other => anyhow::bail!("unknown storage provider: {other}"),
    }
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new().with_ocr("noop", Arc::new(NoopProvider));

    let ocr = &config.ocr;
    if !ocr.api_uri_base.is_empty() {
        let mut http = HttpOcrConfig::new(ocr.api_uri_base.clone());
        http.api_key = ocr.api_key.clone();
        http.api_version = ocr.api_version.clone();
        http.flavor = ocr.flavor.as_deref().map(ApiFlavor::from);
        http.api_token = ocr.api_token.clone();
        http.user_token = ocr.user_token.clone();
        http.max_retries = ocr.max_retries;
        http.retry_delay = Duration::from_millis(ocr.retry_delay_ms);
        registry = registry.with_ocr("http", Arc::new(HttpOcrProvider::new(http)));
    } else if ocr.provider == "http" {
        warn!("ocr.api_uri_base is empty, recognition is unavailable");
    }

    registry.set_preferred_ocr(&ocr.provider)
}

pub fn build_ocr_service(
    config: &AppConfig,
    storage: Arc<dyn StorageProvider>,
) -> anyhow::Result<OcrService> {
    let registry = build_registry(config);
    let provider = registry
        .ocr(None)
        .with_context(|| format!("ocr provider '{}'", config.ocr.provider))?;
    let settings = OcrSettings {
        api_uri_base: config.ocr.api_uri_base.clone(),
        api_version: config.ocr.api_version.clone(),
        timeout: config.ocr.timeout(),
        poll_interval: config.ocr.poll_interval(),
    };
    Ok(OcrService::new(storage, provider, settings))
}

/// Recognizes every labelable asset of `folder`. Failures are reported per
/// asset and never stop the batch.
pub async fn recognize_folder(
    service: &OcrService,
    storage: &dyn StorageProvider,
    folder: Option<&str>,
    rewrite: bool,
    concurrency: usize,
) -> anyhow::Result<Vec<RecognitionOutcome>> {
    let assets = get_assets(storage, folder).await.context("list assets")?;
    info!(count = assets.len(), ?folder, "recognizing folder");

    let outcomes: Vec<RecognitionOutcome> = stream::iter(assets)
        .map(|asset| recognize_one(service, asset, rewrite))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    info!(total = outcomes.len(), failed, "folder recognized");
    Ok(outcomes)
}

async fn recognize_one(service: &OcrService, asset: Asset, rewrite: bool) -> RecognitionOutcome {
    let result = service
        .get_recognized_text(&asset.path, &asset.name, asset.mime_type(), None, rewrite)
        .await;
    match result {
        Ok(doc) => RecognitionOutcome {
            asset: asset.name,
            ok: true,
            error: None,
            lines: doc.line_count(),
        },
        Err(err) => RecognitionOutcome {
            asset: asset.name,
            ok: false,
            error: Some(err.to_string()),
            lines: 0,
        },
    }
}
