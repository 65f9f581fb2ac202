//! Provider abstractions for remote text recognition (OCR) services.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod noop;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// What gets sent to the recognition service.
#[derive(Debug, Clone)]
pub enum OcrRequest {
    /// Raw file content read from storage.
    Bytes { data: Bytes, mime_type: String },
    /// A URL the service (or the client on its behalf) can fetch.
    Url { url: String },
}

/// Outcome of a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Submission {
    /// The service accepted the job; its result is polled at this location.
    Pending { operation_location: String },
    /// The service answered with the result body directly.
    Completed(serde_json::Value),
}

#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    async fn submit(&self, request: OcrRequest) -> Result<Submission, ProviderError>;

    /// Fetches the current status body of an asynchronous job.
    async fn check(&self, operation_location: &str) -> Result<serde_json::Value, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    ocr: HashMap<String, Arc<dyn OcrProvider>>,
    pub preferred_ocr: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(mut self, name: &str, provider: Arc<dyn OcrProvider>) -> Self {
        self.ocr.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_ocr(mut self, name: &str) -> Self {
        self.preferred_ocr = Some(name.to_string());
        self
    }

    pub fn ocr(&self, name: Option<&str>) -> Result<Arc<dyn OcrProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_ocr.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no ocr provider configured".into()))?;
        self.ocr
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }
}
