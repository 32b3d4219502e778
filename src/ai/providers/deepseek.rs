use async_trait::async_trait;

use super::openai_compatible::OpenAICompatibleProvider;
use crate::ai::core::providers::{
    AIProvider, Completion, CompletionRequest, EventStream, ProviderError, ProxyConfig,
};

#[derive(Debug, Clone)]
pub struct DeepSeekProvider {
    inner: OpenAICompatibleProvider,
}

impl DeepSeekProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        proxy_config: Option<ProxyConfig>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.unwrap_or_else(|| "https://api.deepseek.com".to_string());
        let inner = OpenAICompatibleProvider::new(api_key, base_url, "deepseek", proxy_config)?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl AIProvider for DeepSeekProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.inner.complete(request).await
    }

    async fn stream(&self, request: CompletionRequest) -> Result<EventStream, ProviderError> {
        self.inner.stream(request).await
    }

    fn name(&self) -> &'static str {
        "deepseek"
    }
}
