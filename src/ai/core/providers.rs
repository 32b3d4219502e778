use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

use crate::database::models::ModelParameters;

/// One entry of the provider-agnostic message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Provider-agnostic request for one turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier (or upstream assistant id in knowledge-base mode).
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub parameters: ModelParameters,
    /// Existing provider-side thread handle, knowledge-base mode only.
    pub thread: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Buffered (non-streaming) result.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
    /// Thread handle the provider created for this turn, if any.
    pub thread: Option<String>,
}

/// Normalized streaming event sequence every provider reduces to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Incremental assistant text. Zero-length deltas are filtered out by
    /// the provider clients, but consumers must tolerate them anyway.
    ContentDelta(String),
    /// The provider created a new upstream thread for this conversation.
    /// Providers never persist; the relay forwards the handle to storage.
    ThreadCreated(String),
    /// Terminal usage summary. Ends the event sequence on success.
    UsageFinal(TokenUsage),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider rejected the request: {message}")]
    Rejected { status: u16, message: String },
    #[error("upstream thread is no longer valid")]
    StaleThread,
    #[error("provider is not configured: {0}")]
    Configuration(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

/// Optional outbound proxy, stored per provider row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
    #[serde(default)]
    pub ignore_ssl_certificates: bool,
}

#[async_trait]
pub trait AIProvider: Send + Sync + std::fmt::Debug {
    /// Buffered completion for one turn.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Streaming completion. The stream ends with `UsageFinal` on success;
    /// any other termination is an error or a truncated stream.
    async fn stream(&self, request: CompletionRequest) -> Result<EventStream, ProviderError>;

    /// Provider name for logging and the usage ledger.
    fn name(&self) -> &'static str;

    fn supports_streaming(&self) -> bool {
        true
    }
}
