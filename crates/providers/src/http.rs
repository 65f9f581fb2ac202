use crate::{OcrProvider, OcrRequest, ProviderError, Submission};
use base64::Engine;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const OPERATION_LOCATION: &str = "operation-location";
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Wire dialect of the recognition service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// Form Recognizer style: versioned layout endpoint, asynchronous results.
    Azure,
    /// Plain endpoint answering with recognized regions in the POST response.
    Simple,
}

impl ApiFlavor {
    pub fn detect(base_url: &str) -> Self {
        if base_url.contains("azure") {
            ApiFlavor::Azure
        } else {
            ApiFlavor::Simple
        }
    }
}

impl From<&str> for ApiFlavor {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "azure" => ApiFlavor::Azure,
            _ => ApiFlavor::Simple,
        }
    }
}

#[derive(Clone)]
pub struct HttpOcrConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_version: String,
    /// Forced dialect; detected from `base_url` when unset.
    pub flavor: Option<ApiFlavor>,
    /// Credentials embedded in URL submissions (`apikey`, `usertoken`).
    pub api_token: Option<String>,
    pub user_token: Option<String>,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl HttpOcrConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_version: "v2.1".to_string(),
            flavor: None,
            api_token: None,
            user_token: None,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
            .unwrap_or_else(|| ApiFlavor::detect(&self.base_url))
    }

    pub fn analyze_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.flavor() {
            ApiFlavor::Azure => format!(
                "{}/formrecognizer/{}/layout/analyze",
                base, self.api_version
            ),
            ApiFlavor::Simple => base.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct HttpOcrProvider {
    client: Client,
    cfg: Arc<HttpOcrConfig>,
}

#[derive(Serialize)]
struct UrlSubmission<'a> {
    url: &'a str,
    apikey: &'a str,
    images: Vec<String>,
    usertoken: &'a str,
}

impl HttpOcrProvider {
    pub fn new(cfg: HttpOcrConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.cfg.api_key {
            Some(key) => builder.header(SUBSCRIPTION_KEY_HEADER, key),
            None => builder,
        }
    }

    /// Sends the request, retrying throttled (429) answers a bounded number of times.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let builder = self.authorize(builder);
        let mut attempt = 0u32;
        loop {
            let req = builder.try_clone().ok_or_else(|| {
                ProviderError::RequestFailed("request body cannot be replayed".into())
            })?;
            let resp = req
                .send()
                .await
                .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.cfg.max_retries {
                attempt += 1;
                warn!(attempt, "ocr service throttled, retrying");
                tokio::time::sleep(self.cfg.retry_delay).await;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(resp);
        }
    }

    async fn fetch_base64(&self, url: &str) -> Result<String, ProviderError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                status: resp.status().as_u16(),
                body: format!("fetching image {}", url),
            });
        }
        let data = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&data))
    }

    async fn build_submission(&self, request: OcrRequest) -> Result<RequestBuilder, ProviderError> {
        let endpoint = self.cfg.analyze_url();
        match request {
            OcrRequest::Bytes { data, mime_type } => Ok(self
                .client
                .post(endpoint)
                .header(CONTENT_TYPE, mime_type)
                .header(CACHE_CONTROL, "no-cache")
                .body(data)),
            OcrRequest::Url { url } => {
                let images = vec![self.fetch_base64(&url).await?];
                let body = UrlSubmission {
                    url: &url,
                    apikey: self.cfg.api_token.as_deref().unwrap_or_default(),
                    images,
                    usertoken: self.cfg.user_token.as_deref().unwrap_or_default(),
                };
                let body = serde_json::to_vec(&body)
                    .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
                Ok(self
                    .client
                    .post(endpoint)
                    .header(CONTENT_TYPE, "application/json;charset=UTF-8")
                    .body(body))
            }
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for HttpOcrProvider {
    async fn submit(&self, request: OcrRequest) -> Result<Submission, ProviderError> {
        let builder = self.build_submission(request).await?;
        let resp = self.send(builder).await?;

        if let Some(location) = resp.headers().get(OPERATION_LOCATION) {
            let location = location
                .to_str()
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
                .to_string();
            debug!(%location, "ocr job accepted");
            return Ok(Submission::Pending {
                operation_location: location,
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(Submission::Completed(body))
    }

    async fn check(&self, operation_location: &str) -> Result<serde_json::Value, ProviderError> {
        let resp = self.send(self.client.get(operation_location)).await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_base_gets_versioned_layout_endpoint() {
        let cfg = HttpOcrConfig::new("https://westus.api.cognitive.azure.com/");
        assert_eq!(cfg.flavor(), ApiFlavor::Azure);
        assert_eq!(
            cfg.analyze_url(),
            "https://westus.api.cognitive.azure.com/formrecognizer/v2.1/layout/analyze"
        );
    }

    #[test]
    fn other_bases_are_used_verbatim() {
        let cfg = HttpOcrConfig::new("http://10.1.2.3:8866/predict/ocr_system");
        assert_eq!(cfg.flavor(), ApiFlavor::Simple);
        assert_eq!(cfg.analyze_url(), "http://10.1.2.3:8866/predict/ocr_system");
    }

    #[test]
    fn forced_flavor_overrides_detection() {
        let mut cfg = HttpOcrConfig::new("http://127.0.0.1:5000");
        cfg.flavor = Some(ApiFlavor::from("Azure"));
        cfg.api_version = "v2.0".into();
        assert_eq!(
            cfg.analyze_url(),
            "http://127.0.0.1:5000/formrecognizer/v2.0/layout/analyze"
        );
    }

    #[test]
    fn url_submission_serializes_expected_fields() {
        let body = UrlSubmission {
            url: "http://minio:9000/datasets/a.jpg",
            apikey: "k",
            images: vec!["aGVsbG8=".into()],
            usertoken: "u",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["url"], "http://minio:9000/datasets/a.jpg");
        assert_eq!(v["images"][0], "aGVsbG8=");
        assert_eq!(v["apikey"], "k");
        assert_eq!(v["usertoken"], "u");
    }
}
