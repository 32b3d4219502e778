//! Model-family capability table.
//!
//! Parameter quirks are a function of the model id, resolved once per
//! request through this table instead of ad-hoc string checks at call
//! sites. Reasoning families reject the classic sampling knobs and use a
//! different output-length parameter name; sending them anyway is a hard
//! request error upstream, so incompatible parameters are omitted entirely.

/// Which JSON field carries the output-length limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTokenParam {
    MaxTokens,
    MaxCompletionTokens,
}

impl OutputTokenParam {
    pub fn field_name(&self) -> &'static str {
        match self {
            OutputTokenParam::MaxTokens => "max_tokens",
            OutputTokenParam::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub reasoning: bool,
    pub supports_temperature: bool,
    pub supports_top_p: bool,
    pub supports_penalties: bool,
    pub output_token_param: OutputTokenParam,
    pub supports_streaming: bool,
}

const DEFAULT_CAPABILITIES: ModelCapabilities = ModelCapabilities {
    reasoning: false,
    supports_temperature: true,
    supports_top_p: true,
    supports_penalties: true,
    output_token_param: OutputTokenParam::MaxTokens,
    supports_streaming: true,
};

const REASONING_CAPABILITIES: ModelCapabilities = ModelCapabilities {
    reasoning: true,
    supports_temperature: false,
    supports_top_p: false,
    supports_penalties: false,
    output_token_param: OutputTokenParam::MaxCompletionTokens,
    supports_streaming: true,
};

struct CapabilityRule {
    prefix: &'static str,
    capabilities: ModelCapabilities,
}

const CAPABILITY_TABLE: &[CapabilityRule] = &[
    CapabilityRule { prefix: "o1", capabilities: REASONING_CAPABILITIES },
    CapabilityRule { prefix: "o3", capabilities: REASONING_CAPABILITIES },
    CapabilityRule { prefix: "o4", capabilities: REASONING_CAPABILITIES },
    CapabilityRule { prefix: "gpt-5", capabilities: REASONING_CAPABILITIES },
    CapabilityRule {
        prefix: "deepseek-reasoner",
        capabilities: ModelCapabilities {
            // DeepSeek's reasoner keeps the classic max_tokens name.
            output_token_param: OutputTokenParam::MaxTokens,
            ..REASONING_CAPABILITIES
        },
    },
];

/// Resolve capabilities for a model id by longest matching prefix.
pub fn capabilities_for(model: &str) -> ModelCapabilities {
    CAPABILITY_TABLE
        .iter()
        .filter(|rule| model.starts_with(rule.prefix))
        .max_by_key(|rule| rule.prefix.len())
        .map(|rule| rule.capabilities)
        .unwrap_or(DEFAULT_CAPABILITIES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_models_keep_sampling_parameters() {
        let caps = capabilities_for("gpt-4o-mini");
        assert!(!caps.reasoning);
        assert!(caps.supports_temperature);
        assert!(caps.supports_top_p);
        assert!(caps.supports_penalties);
        assert_eq!(caps.output_token_param, OutputTokenParam::MaxTokens);
    }

    #[test]
    fn reasoning_models_suppress_sampling_parameters() {
        for model in ["o1-preview", "o3-mini", "o4-mini", "gpt-5-turbo"] {
            let caps = capabilities_for(model);
            assert!(caps.reasoning, "{model} should be a reasoning model");
            assert!(!caps.supports_temperature);
            assert!(!caps.supports_top_p);
            assert!(!caps.supports_penalties);
            assert_eq!(
                caps.output_token_param,
                OutputTokenParam::MaxCompletionTokens
            );
        }
    }

    #[test]
    fn deepseek_reasoner_uses_classic_output_param() {
        let caps = capabilities_for("deepseek-reasoner");
        assert!(caps.reasoning);
        assert_eq!(caps.output_token_param, OutputTokenParam::MaxTokens);
    }

    #[test]
    fn deepseek_chat_is_a_plain_chat_model() {
        let caps = capabilities_for("deepseek-chat");
        assert!(!caps.reasoning);
        assert!(caps.supports_temperature);
    }

    #[test]
    fn longest_prefix_wins() {
        // "deepseek-reasoner" must beat any shorter hypothetical rule and
        // the default.
        let caps = capabilities_for("deepseek-reasoner-v2");
        assert!(caps.reasoning);
    }
}
