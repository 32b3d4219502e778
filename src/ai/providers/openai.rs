use async_trait::async_trait;

use super::openai_compatible::OpenAICompatibleProvider;
use crate::ai::core::providers::{
    AIProvider, Completion, CompletionRequest, EventStream, ProviderError, ProxyConfig,
};

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    inner: OpenAICompatibleProvider,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        proxy_config: Option<ProxyConfig>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let inner = OpenAICompatibleProvider::new(api_key, base_url, "openai", proxy_config)?;

        Ok(Self { inner })
    }

    /// Translate well-known OpenAI failure phrases into friendlier messages
    /// before they reach the relay's terminal error event.
    fn refine_error(error: ProviderError) -> ProviderError {
        if let ProviderError::Rejected { status, message } = &error {
            if *status == 429 || message.contains("rate_limit_exceeded") {
                return ProviderError::Rejected {
                    status: *status,
                    message: "OpenAI rate limit exceeded, retry shortly".to_string(),
                };
            }
            if message.contains("insufficient_quota") {
                return ProviderError::Rejected {
                    status: *status,
                    message: "OpenAI account quota exhausted".to_string(),
                };
            }
        }
        error
    }
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.inner.complete(request).await.map_err(Self::refine_error)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<EventStream, ProviderError> {
        self.inner.stream(request).await.map_err(Self::refine_error)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
