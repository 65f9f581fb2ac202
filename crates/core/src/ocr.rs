//! Text recognition with a storage-backed result cache.
//!
//! A recognized document is looked up next to the asset first. On a miss
//! (or when a rewrite is forced) the asset is submitted to the OCR provider,
//! asynchronous jobs are polled to completion, and the normalized result is
//! written back to storage before it is returned.

use crate::document::{
    is_valid_ocr_format, normalize_regions, to_pretty_json, OcrDocument, RegionResponse,
};
use crate::models::{decode_key, ocr_file_name};
use crate::poll::{poll, PollError, PollStatus};
use providers::{OcrProvider, OcrRequest, ProviderError, Submission};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storage::{StorageError, StorageProvider};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Status string of a finished asynchronous job.
pub const STATUS_SUCCEEDED: &str = "succeeded";
const STATUS_FAILED: &str = "failed";
/// `file_path` prefix marking assets whose bytes are read from storage.
pub const LOCAL_FILE_SCHEME: &str = "file:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OcrStatus {
    LoadingFromCache,
    RunningOcr,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Poll(#[from] PollError<ProviderError>),
    #[error("ocr service reported failure: {0}")]
    Unsuccessful(String),
    #[error("unexpected ocr result: {0}")]
    InvalidResult(String),
    #[error("invalid ocr json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub api_uri_base: String,
    pub api_version: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            api_uri_base: String::new(),
            api_version: "v2.1".to_string(),
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(1500),
        }
    }
}

pub type StatusCallback<'a> = &'a (dyn Fn(OcrStatus) + Send + Sync);

#[derive(Clone)]
pub struct OcrService {
    storage: Arc<dyn StorageProvider>,
    provider: Arc<dyn OcrProvider>,
    settings: OcrSettings,
}

impl OcrService {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        provider: Arc<dyn OcrProvider>,
        settings: OcrSettings,
    ) -> Self {
        Self {
            storage,
            provider,
            settings,
        }
    }

    /// Returns the recognized text document for an asset.
    ///
    /// `file_path` is the asset URL (`file:` for objects read straight from
    /// storage), `file_name` its storage key. The cached sidecar is used
    /// unless it is missing, unreadable, malformed, or `rewrite` is set.
    pub async fn get_recognized_text(
        &self,
        file_path: &str,
        file_name: &str,
        mime_type: Option<&str>,
        on_status: Option<StatusCallback<'_>>,
        rewrite: bool,
    ) -> Result<OcrDocument, OcrError> {
        if file_path.is_empty() {
            return Err(OcrError::MissingArgument("file_path"));
        }
        if self.settings.api_uri_base.is_empty() {
            return Err(OcrError::MissingArgument("api_uri_base"));
        }
        let notify = |status: OcrStatus| {
            if let Some(cb) = on_status {
                cb(status);
            }
        };
        let ocr_file = ocr_file_name(file_name);

        notify(OcrStatus::LoadingFromCache);
        let result = match self.read_cached(&ocr_file).await {
            Ok(Some(doc)) if !rewrite => {
                debug!(%ocr_file, "ocr cache hit");
                Ok(doc)
            }
            Ok(_) => {
                notify(OcrStatus::RunningOcr);
                self.fetch_result(file_path, file_name, &ocr_file, mime_type)
                    .await
            }
            Err(err) => {
                debug!(%ocr_file, error = %err, "ocr cache unavailable");
                notify(OcrStatus::RunningOcr);
                self.fetch_result(file_path, file_name, &ocr_file, mime_type)
                    .await
            }
        };

        match &result {
            Ok(_) => notify(OcrStatus::Done),
            Err(err) => {
                warn!(%file_name, error = %err, "ocr failed");
                notify(OcrStatus::Failed);
            }
        }
        result
    }

    /// `Ok(None)` when the sidecar has no `analyzeResult.readResults` or
    /// its fields have the wrong JSON types.
    async fn read_cached(&self, ocr_file: &str) -> Result<Option<OcrDocument>, OcrError> {
        let json = self.storage.read_text(ocr_file).await?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        if !is_valid_ocr_format(&value) {
            return Ok(None);
        }
        match serde_json::from_value(value) {
            Ok(doc) => Ok(Some(doc)),
            Err(err) => {
                warn!(%ocr_file, error = %err, "cached ocr result does not match schema");
                Ok(None)
            }
        }
    }

    async fn fetch_result(
        &self,
        file_path: &str,
        file_name: &str,
        ocr_file: &str,
        mime_type: Option<&str>,
    ) -> Result<OcrDocument, OcrError> {
        let request = if file_path.starts_with(LOCAL_FILE_SCHEME) {
            let key = decode_key(file_name);
            let data = self.storage.read_binary(&key).await?;
            let mime_type = mime_type
                .map(str::to_string)
                .or_else(|| infer::get(&data).map(|t| t.mime_type().to_string()))
                .unwrap_or_else(|| "application/octet-stream".to_string());
            OcrRequest::Bytes { data, mime_type }
        } else {
            OcrRequest::Url {
                url: file_path.to_string(),
            }
        };

        info!(%file_name, "running ocr");
        match self.provider.submit(request).await? {
            Submission::Pending { operation_location } => {
                let body = self.wait_for_layout(&operation_location).await?;
                self.save(ocr_file, &body).await?;
                serde_json::from_value(body).map_err(|e| OcrError::InvalidResult(e.to_string()))
            }
            Submission::Completed(body) => {
                let resp: RegionResponse = serde_json::from_value(body)
                    .map_err(|e| OcrError::InvalidResult(e.to_string()))?;
                if !resp.is_success() {
                    return Err(OcrError::Unsuccessful(resp.msg));
                }
                let doc = normalize_regions(resp, &self.settings.api_version);
                self.save(ocr_file, &doc).await?;
                Ok(doc)
            }
        }
    }

    /// Final body of the job at `operation_location`, untouched.
    async fn wait_for_layout(
        &self,
        operation_location: &str,
    ) -> Result<serde_json::Value, OcrError> {
        debug!(%operation_location, "polling ocr job");
        let provider = &self.provider;
        let body = poll(
            move || async move {
                let body = provider.check(operation_location).await?;
                Ok::<_, ProviderError>(job_status(body))
            },
            self.settings.timeout,
            self.settings.poll_interval,
        )
        .await?;
        Ok(body)
    }

    async fn save<T: Serialize>(&self, ocr_file: &str, result: &T) -> Result<(), OcrError> {
        let json = to_pretty_json(result)?;
        self.storage.write_text(ocr_file, &json).await?;
        debug!(%ocr_file, "ocr result cached");
        Ok(())
    }
}

fn job_status(body: serde_json::Value) -> PollStatus<serde_json::Value> {
    let status = body
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_lowercase();
    match status.as_str() {
        STATUS_SUCCEEDED => PollStatus::Ready(body),
        STATUS_FAILED => {
            let reason = body
                .get("error")
                .or_else(|| body.get("errors"))
                .map(|e| e.to_string())
                .unwrap_or_else(|| "ocr job failed".to_string());
            PollStatus::Failed(reason)
        }
        _ => PollStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_status_is_case_insensitive() {
        assert!(matches!(
            job_status(json!({"status": "Succeeded"})),
            PollStatus::Ready(_)
        ));
        assert!(matches!(
            job_status(json!({"status": "running"})),
            PollStatus::Pending
        ));
        assert!(matches!(job_status(json!({})), PollStatus::Pending));
    }

    #[test]
    fn failed_job_carries_error_detail() {
        match job_status(json!({"status": "failed", "error": {"code": "InvalidImage"}})) {
            PollStatus::Failed(reason) => assert!(reason.contains("InvalidImage")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
