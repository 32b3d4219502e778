//! Provider dispatch: pure routing from assistant configuration to a
//! concrete client. Knowledge-base assistants run over the OpenAI
//! assistants API; everything else is a plain chat completion backend
//! chosen by the provider row's kind.

use std::sync::Arc;

use crate::ai::core::providers::{AIProvider, ProviderError};
use crate::ai::providers::{DeepSeekProvider, OpenAIAssistantsProvider, OpenAIProvider};
use crate::database::models::{Assistant, Provider};

pub fn create_provider(
    provider: &Provider,
    assistant: &Assistant,
) -> Result<Arc<dyn AIProvider>, ProviderError> {
    if !provider.enabled {
        return Err(ProviderError::Configuration(
            "provider is disabled".to_string(),
        ));
    }
    if provider.api_key.trim().is_empty() {
        return Err(ProviderError::Configuration(
            "provider has no API credentials".to_string(),
        ));
    }

    if assistant.use_knowledge_base {
        if provider.kind != "openai" {
            return Err(ProviderError::Configuration(format!(
                "knowledge-base mode requires an OpenAI provider, got '{}'",
                provider.kind
            )));
        }
        let client = OpenAIAssistantsProvider::new(
            provider.api_key.clone(),
            provider.base_url.clone(),
            provider.proxy.clone(),
        )?;
        return Ok(Arc::new(client));
    }

    match provider.kind.as_str() {
        "openai" => {
            let client = OpenAIProvider::new(
                provider.api_key.clone(),
                provider.base_url.clone(),
                provider.proxy.clone(),
            )?;
            Ok(Arc::new(client))
        }
        "deepseek" => {
            let client = DeepSeekProvider::new(
                provider.api_key.clone(),
                provider.base_url.clone(),
                provider.proxy.clone(),
            )?;
            Ok(Arc::new(client))
        }
        other => Err(ProviderError::Configuration(format!(
            "unknown provider kind '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ModelParameters;
    use chrono::Utc;
    use uuid::Uuid;

    fn provider_row(kind: &str, api_key: &str, enabled: bool) -> Provider {
        Provider {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            api_key: api_key.to_string(),
            base_url: None,
            enabled,
            proxy: None,
            created_at: Utc::now(),
        }
    }

    fn assistant_row(use_knowledge_base: bool) -> Assistant {
        Assistant {
            id: Uuid::new_v4(),
            name: "support".to_string(),
            description: None,
            instructions: Some("be helpful".to_string()),
            provider_id: Uuid::new_v4(),
            model: "gpt-4o".to_string(),
            parameters: ModelParameters::default(),
            use_knowledge_base,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn routes_plain_assistants_by_provider_kind() {
        let provider = create_provider(&provider_row("openai", "sk-x", true), &assistant_row(false))
            .expect("openai provider");
        assert_eq!(provider.name(), "openai");

        let provider =
            create_provider(&provider_row("deepseek", "sk-x", true), &assistant_row(false))
                .expect("deepseek provider");
        assert_eq!(provider.name(), "deepseek");
    }

    #[test]
    fn knowledge_base_requires_openai() {
        let err = create_provider(&provider_row("deepseek", "sk-x", true), &assistant_row(true))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        assert!(
            create_provider(&provider_row("openai", "sk-x", true), &assistant_row(true)).is_ok()
        );
    }

    #[test]
    fn missing_credentials_are_a_configuration_error() {
        let err =
            create_provider(&provider_row("openai", "  ", true), &assistant_row(false)).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn disabled_provider_is_rejected() {
        let err = create_provider(&provider_row("openai", "sk-x", false), &assistant_row(false))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = create_provider(&provider_row("acme", "sk-x", true), &assistant_row(false))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
