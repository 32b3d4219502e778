pub mod core;
pub mod factory;
pub mod providers;

pub use self::core::{
    AIProvider, ChatMessage, Completion, CompletionRequest, EventStream, ProviderError,
    ProviderEvent, ProxyConfig, TokenUsage,
};
