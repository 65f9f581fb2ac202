//! S3 adapter: maps the storage interface onto bucket/object calls of an
//! S3-compatible server (MinIO in the default deployment).

use crate::{
    decode_text, non_empty, StorageError, StorageProvider, StorageType, DEFAULT_BUCKET,
    DEFAULT_REGION,
};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Options {
    pub endpoint: String,
    pub port: u16,
    pub use_ssl: bool,
    /// Static credentials; the AWS environment chain is used when unset.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: String,
    pub region: String,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1".to_string(),
            port: 9000,
            use_ssl: false,
            access_key: None,
            secret_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl S3Options {
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.endpoint, self.port)
    }

    /// Public URL of an object: endpoint, bucket and key joined by `/`.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint_url(), self.bucket, key)
    }
}

pub struct S3Storage {
    client: Client,
    options: S3Options,
    bucket_ready: OnceCell<()>,
}

impl S3Storage {
    pub async fn new(options: S3Options) -> Result<Self, StorageError> {
        if options.endpoint.trim().is_empty() {
            return Err(StorageError::Config("endpoint must not be empty".into()));
        }
        if options.bucket.trim().is_empty() {
            return Err(StorageError::Config("bucket must not be empty".into()));
        }
        let region = Region::new(options.region.clone());
        let builder = match (&options.access_key, &options.secret_key) {
            (Some(access), Some(secret)) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(Credentials::new(
                    access.clone(),
                    secret.clone(),
                    None,
                    None,
                    "labeler-static",
                )),
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };
        let conf = builder
            .endpoint_url(options.endpoint_url())
            .force_path_style(true)
            .build();
        debug!(endpoint = %options.endpoint_url(), bucket = %options.bucket, "s3 client ready");
        Ok(Self {
            client: Client::from_conf(conf),
            options,
            bucket_ready: OnceCell::new(),
        })
    }

    /// Returns the bucket name, creating the bucket on first use if it is missing.
    async fn bucket(&self) -> Result<&str, StorageError> {
        let bucket = self.options.bucket.as_str();
        self.bucket_ready
            .get_or_try_init(|| async {
                match self.client.head_bucket().bucket(bucket).send().await {
                    Ok(_) => Ok(()),
                    Err(err) => {
                        let err = translate(bucket, err);
                        if !err.is_not_found() {
                            return Err(err);
                        }
                        self.create_bucket().await
                    }
                }
            })
            .await?;
        Ok(bucket)
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        let bucket = self.options.bucket.as_str();
        info!(bucket, region = %self.options.region, "creating bucket");
        let mut req = self.client.create_bucket().bucket(bucket);
        if self.options.region != DEFAULT_REGION {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.options.region.as_str(),
                    ))
                    .build(),
            );
        }
        match req.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                Ok(())
            }
            Err(err) => Err(translate(bucket, err)),
        }
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, StorageError> {
        let bucket = self.bucket().await?;
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| translate(key, e))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend {
                status: None,
                code: None,
                message: e.to_string(),
            })?;
        Ok(data.into_bytes())
    }

    async fn put_object(
        &self,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let bucket = self.bucket().await?;
        let len = content.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| translate(key, e))?;
        debug!(key, bytes = len, "object written");
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageProvider for S3Storage {
    fn storage_type(&self) -> StorageType {
        StorageType::Cloud
    }

    async fn read_text(&self, key: &str) -> Result<String, StorageError> {
        let data = self.get_object(key).await?;
        decode_text(key, data)
    }

    async fn read_binary(&self, key: &str) -> Result<Bytes, StorageError> {
        self.get_object(key).await
    }

    async fn write_text(&self, key: &str, content: &str) -> Result<(), StorageError> {
        self.put_object(
            key,
            Bytes::copy_from_slice(content.as_bytes()),
            Some("text/plain; charset=utf-8"),
        )
        .await
    }

    async fn write_binary(&self, key: &str, content: Bytes) -> Result<(), StorageError> {
        self.put_object(key, content, None).await
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        let bucket = self.bucket().await?;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| translate(key, e))?;
        debug!(key, "object deleted");
        Ok(())
    }

    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let bucket = self.bucket().await?;
        let prefix = non_empty(prefix);
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .into_paginator()
            .send();
        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| translate(prefix.unwrap_or(bucket), e))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|o| o.key())
                    .map(str::to_string),
            );
        }
        debug!(count = keys.len(), ?prefix, "listed objects");
        Ok(keys)
    }

    async fn is_file_exists(&self, key: &str) -> Result<bool, StorageError> {
        let bucket = self.bucket().await?;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match translate(key, err) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn get_url(&self, key: &str) -> Result<String, StorageError> {
        let _ = self.bucket().await?;
        Ok(self.options.object_url(key))
    }
}

fn translate<E>(key: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let dispatch_failed = matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    );
    let message = DisplayErrorContext(&err).to_string();
    StorageError::classify(key, status, code.as_deref(), dispatch_failed, message)
}
