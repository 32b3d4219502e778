//! Chat-completions wire client shared by every OpenAI-compatible backend.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::ai::core::capabilities::capabilities_for;
use crate::ai::core::provider_base::build_http_client;
use crate::ai::core::providers::{
    AIProvider, ChatMessage, Completion, CompletionRequest, EventStream, ProviderError,
    ProviderEvent, ProxyConfig, TokenUsage,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct OpenAICompatibleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    provider_name: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

impl WireUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.prompt_tokens.unwrap_or(0),
            output_tokens: self.completion_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStreamResponse {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WireStreamDelta {
    content: Option<String>,
}

/// One parsed `data:` frame of a completions event stream.
#[derive(Debug, Default, PartialEq)]
pub(super) struct StreamFrame {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Parse a single SSE `data:` payload. Returns `None` for frames that carry
/// nothing of interest (heartbeats, padding, empty deltas).
pub(super) fn parse_stream_data(data: &str) -> Result<Option<StreamFrame>, ProviderError> {
    let response: WireStreamResponse = serde_json::from_str(data)
        .map_err(|e| ProviderError::Protocol(format!("malformed stream frame: {}", e)))?;

    let mut frame = StreamFrame::default();

    if let Some(usage) = response.usage {
        frame.usage = Some(usage.into_usage());
    }

    if let Some(choice) = response.choices.into_iter().next() {
        // Zero-length deltas are keep-alive noise; drop them here.
        frame.content = choice.delta.content.filter(|c| !c.is_empty());
        frame.finish_reason = choice.finish_reason;
    }

    if frame == StreamFrame::default() {
        Ok(None)
    } else {
        Ok(Some(frame))
    }
}

impl OpenAICompatibleProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        provider_name: &'static str,
        proxy_config: Option<ProxyConfig>,
    ) -> Result<Self, ProviderError> {
        let client = build_http_client(&base_url, proxy_config.as_ref(), Some(REQUEST_TIMEOUT))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            provider_name,
        })
    }

    /// Build the request payload, filtering sampling parameters through the
    /// capability table so model families never see parameters they reject.
    pub(super) fn build_payload(request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let caps = capabilities_for(&request.model);
        let params = &request.parameters;

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|ChatMessage { role, content }| json!({ "role": role, "content": content }))
            .collect();

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        });

        if caps.supports_temperature {
            if let Some(temperature) = params.temperature {
                payload["temperature"] = json!(temperature);
            }
        }
        if caps.supports_top_p {
            if let Some(top_p) = params.top_p {
                payload["top_p"] = json!(top_p);
            }
        }
        if caps.supports_penalties {
            if let Some(frequency_penalty) = params.frequency_penalty {
                payload["frequency_penalty"] = json!(frequency_penalty);
            }
            if let Some(presence_penalty) = params.presence_penalty {
                payload["presence_penalty"] = json!(presence_penalty);
            }
        }
        if let Some(max_tokens) = params.max_tokens {
            payload[caps.output_token_param.field_name()] = json!(max_tokens);
        }
        if caps.reasoning {
            if let Some(effort) = &params.reasoning_effort {
                payload["reasoning_effort"] = json!(effort);
            }
        }
        if let Some(stop) = &params.stop {
            if !stop.is_empty() {
                payload["stop"] = json!(stop);
            }
        }
        if let Some(format) = &params.response_format {
            payload["response_format"] = json!({ "type": format });
        }
        if stream {
            // Ask for the terminal usage frame.
            payload["stream_options"] = json!({ "include_usage": true });
        }

        payload
    }

    fn endpoint_url(&self) -> String {
        if self.base_url.contains("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    async fn send_request(
        &self,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint_url())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = self.provider_name, %status, "provider rejected request: {}", body);
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: format!("{} returned HTTP {}", self.provider_name, status),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl AIProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let payload = Self::build_payload(&request, false);
        let response = self.send_request(&payload).await?;

        let api_response: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed response body: {}", e)))?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::Protocol(format!("no choices returned by {}", self.provider_name))
        })?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            usage: api_response.usage.map(WireUsage::into_usage),
            thread: None,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<EventStream, ProviderError> {
        if !capabilities_for(&request.model).supports_streaming {
            return Err(ProviderError::Configuration(format!(
                "model '{}' does not support streaming responses",
                request.model
            )));
        }

        let payload = Self::build_payload(&request, true);
        let response = self.send_request(&payload).await?;
        let provider_name = self.provider_name;

        let stream = try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut usage: Option<TokenUsage> = None;

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(ProviderError::Transport)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer.drain(..=line_end);

                    if line.is_empty() {
                        continue;
                    }
                    if line == "data: [DONE]" {
                        break 'outer;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    match parse_stream_data(data) {
                        Ok(Some(frame)) => {
                            if let Some(content) = frame.content {
                                yield ProviderEvent::ContentDelta(content);
                            }
                            if let Some(frame_usage) = frame.usage {
                                usage = Some(frame_usage);
                            }
                            if let Some(reason) = frame.finish_reason {
                                if reason != "stop" {
                                    warn!(
                                        provider = provider_name,
                                        "generation finished with reason '{}'", reason
                                    );
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(provider = provider_name, "skipping unparseable frame: {}", e);
                        }
                    }
                }
            }

            // The usage frame is the stream's terminal signal; without it
            // the relay treats the turn as truncated.
            if let Some(usage) = usage {
                yield ProviderEvent::UsageFinal(usage);
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ModelParameters;

    fn request_for(model: &str, parameters: ModelParameters) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            parameters,
            thread: None,
        }
    }

    fn full_parameters() -> ModelParameters {
        ModelParameters {
            temperature: Some(0.7),
            top_p: Some(0.95),
            max_tokens: Some(1024),
            frequency_penalty: Some(0.1),
            presence_penalty: Some(0.2),
            reasoning_effort: Some("high".to_string()),
            ..ModelParameters::default()
        }
    }

    #[test]
    fn chat_model_payload_carries_sampling_parameters() {
        let payload =
            OpenAICompatibleProvider::build_payload(&request_for("gpt-4o", full_parameters()), false);

        assert_eq!(payload["temperature"], 0.7);
        assert_eq!(payload["top_p"], 0.95);
        assert_eq!(payload["frequency_penalty"], 0.1);
        assert_eq!(payload["presence_penalty"], 0.2);
        assert_eq!(payload["max_tokens"], 1024);
        assert!(payload.get("max_completion_tokens").is_none());
        assert!(payload.get("reasoning_effort").is_none());
    }

    #[test]
    fn reasoning_model_payload_omits_sampling_parameters() {
        let payload = OpenAICompatibleProvider::build_payload(
            &request_for("o3-mini", full_parameters()),
            false,
        );

        assert!(payload.get("temperature").is_none());
        assert!(payload.get("top_p").is_none());
        assert!(payload.get("frequency_penalty").is_none());
        assert!(payload.get("presence_penalty").is_none());
        assert!(payload.get("max_tokens").is_none());
        assert_eq!(payload["max_completion_tokens"], 1024);
        assert_eq!(payload["reasoning_effort"], "high");
    }

    #[test]
    fn stream_payload_requests_usage_frame() {
        let payload = OpenAICompatibleProvider::build_payload(
            &request_for("gpt-4o", ModelParameters::default()),
            true,
        );

        assert_eq!(payload["stream"], true);
        assert_eq!(payload["stream_options"]["include_usage"], true);
    }

    #[test]
    fn stop_sequences_and_response_format_are_forwarded() {
        let parameters = ModelParameters {
            stop: Some(vec!["END".to_string()]),
            response_format: Some("json_object".to_string()),
            ..ModelParameters::default()
        };
        let payload =
            OpenAICompatibleProvider::build_payload(&request_for("gpt-4o", parameters), false);

        assert_eq!(payload["stop"][0], "END");
        assert_eq!(payload["response_format"]["type"], "json_object");
    }

    #[test]
    fn parse_content_delta_frame() {
        let frame = parse_stream_data(
            r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(frame.content.as_deref(), Some("Hel"));
        assert!(frame.usage.is_none());
    }

    #[test]
    fn parse_skips_empty_delta_noise() {
        let frame =
            parse_stream_data(r#"{"choices":[{"delta":{"content":""},"finish_reason":null}]}"#)
                .unwrap();
        assert!(frame.is_none());

        let frame = parse_stream_data(r#"{"choices":[{"delta":{},"finish_reason":null}]}"#).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn parse_finish_reason_frame() {
        let frame =
            parse_stream_data(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#)
                .unwrap()
                .unwrap();
        assert_eq!(frame.finish_reason.as_deref(), Some("length"));
        assert!(frame.content.is_none());
    }

    #[test]
    fn parse_usage_frame() {
        let frame = parse_stream_data(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            frame.usage,
            Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5
            })
        );
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(parse_stream_data("{not json").is_err());
    }
}
