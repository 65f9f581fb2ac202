use crate::{OcrProvider, OcrRequest, ProviderError, Submission};

#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl OcrProvider for NoopProvider {
    async fn submit(&self, _request: OcrRequest) -> Result<Submission, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn check(&self, _operation_location: &str) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
