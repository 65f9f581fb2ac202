//! Storage layer: object-store adapters keyed by string paths.
//!
//! Holds the `StorageProvider` trait, the S3 adapter and an in-memory
//! adapter, plus the translation of backend failures into a small set of
//! application error kinds.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod s3;

pub use memory::MemoryStorage;
pub use s3::{S3Options, S3Storage};

/// Bucket every adapter writes into unless configured otherwise.
pub const DEFAULT_BUCKET: &str = "datasets";
/// Region used when the bucket has to be created.
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    Local,
    Cloud,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("access to object forbidden: {0}")]
    Forbidden(String),
    #[error("request could not be sent: {0}")]
    RequestSend(String),
    #[error("storage backend error (status {status:?}, code {code:?}): {message}")]
    Backend {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
    #[error("object {key} is not valid utf-8 text")]
    InvalidText { key: String },
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Maps a backend failure onto an application error kind.
    ///
    /// `404` and the not-found family of error codes become `NotFound`,
    /// `403` becomes `Forbidden`, a request that never reached the server
    /// becomes `RequestSend`. Everything else is carried through as
    /// `Backend` with its status, code and message intact.
    pub fn classify(
        key: &str,
        status: Option<u16>,
        code: Option<&str>,
        dispatch_failed: bool,
        message: impl Into<String>,
    ) -> Self {
        if status == Some(404) || matches!(code, Some("NoSuchKey" | "NoSuchBucket" | "NotFound")) {
            return StorageError::NotFound(key.to_string());
        }
        if status == Some(403) {
            return StorageError::Forbidden(key.to_string());
        }
        let message = message.into();
        if dispatch_failed {
            return StorageError::RequestSend(message);
        }
        StorageError::Backend {
            status,
            code: code.map(str::to_string),
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    fn storage_type(&self) -> StorageType;

    async fn read_text(&self, key: &str) -> Result<String, StorageError>;

    async fn read_binary(&self, key: &str) -> Result<Bytes, StorageError>;

    async fn write_text(&self, key: &str, content: &str) -> Result<(), StorageError>;

    async fn write_binary(&self, key: &str, content: Bytes) -> Result<(), StorageError>;

    async fn delete_file(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every key, or only keys starting with `prefix` when it is non-empty.
    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    async fn is_file_exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn get_url(&self, key: &str) -> Result<String, StorageError>;
}

/// Connects to an S3-compatible server with the given options.
pub async fn connect(options: S3Options) -> anyhow::Result<S3Storage> {
    let storage = S3Storage::new(options).await?;
    Ok(storage)
}

pub(crate) fn decode_text(key: &str, data: Bytes) -> Result<String, StorageError> {
    String::from_utf8(data.to_vec()).map_err(|_| StorageError::InvalidText {
        key: key.to_string(),
    })
}

pub(crate) fn non_empty(prefix: Option<&str>) -> Option<&str> {
    prefix.filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_maps_to_not_found() {
        let err = StorageError::classify("a.jpg", Some(404), None, false, "missing");
        assert!(matches!(err, StorageError::NotFound(k) if k == "a.jpg"));
    }

    #[test]
    fn no_such_key_code_maps_to_not_found_without_status() {
        let err = StorageError::classify("a.jpg", None, Some("NoSuchKey"), false, "missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn status_403_maps_to_forbidden() {
        let err = StorageError::classify("a.jpg", Some(403), Some("AccessDenied"), false, "denied");
        assert!(matches!(err, StorageError::Forbidden(_)));
    }

    #[test]
    fn dispatch_failure_maps_to_request_send() {
        let err = StorageError::classify("a.jpg", None, None, true, "connection refused");
        assert!(matches!(err, StorageError::RequestSend(m) if m == "connection refused"));
    }

    #[test]
    fn other_failures_pass_through_unchanged() {
        let err = StorageError::classify("a.jpg", Some(500), Some("InternalError"), false, "boom");
        match err {
            StorageError::Backend {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(500));
                assert_eq!(code.as_deref(), Some("InternalError"));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_prefix_is_treated_as_none() {
        assert_eq!(non_empty(Some("")), None);
        assert_eq!(non_empty(Some("set1/")), Some("set1/"));
        assert_eq!(non_empty(None), None);
    }
}
