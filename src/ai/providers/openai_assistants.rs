//! Retrieval-mode client over the OpenAI assistants API.
//!
//! Knowledge-base assistants keep conversation state in a provider-side
//! thread. This client creates the thread on demand, submits the new user
//! turn, polls the run to a terminal state, and fetches the newest assistant
//! message. It never persists anything; thread handles travel back to the
//! caller through `ProviderEvent::ThreadCreated` / `Completion::thread`.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ai::core::provider_base::build_http_client;
use crate::ai::core::providers::{
    AIProvider, Completion, CompletionRequest, EventStream, ProviderError, ProviderEvent,
    ProxyConfig, TokenUsage,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on run polling: 60 polls at one-second intervals.
const MAX_RUN_POLLS: u32 = 60;
const RUN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct OpenAIAssistantsProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
    usage: Option<RunUsage>,
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

/// How one observed run status advances the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RunDisposition {
    /// Keep polling.
    Pending,
    Completed,
    /// Terminal failure state reported by the provider.
    Failed(String),
}

pub(super) fn classify_run_status(status: &str) -> RunDisposition {
    match status {
        "completed" => RunDisposition::Completed,
        "queued" | "in_progress" | "requires_action" => RunDisposition::Pending,
        "failed" | "expired" | "cancelled" | "cancelling" | "incomplete" => {
            RunDisposition::Failed(format!("run ended in state '{}'", status))
        }
        other => RunDisposition::Failed(format!("run ended in unknown state '{}'", other)),
    }
}

/// A 404 against a thread URL means the stored handle no longer resolves.
/// The caller clears the handle so the next turn recreates the thread.
pub(super) fn is_thread_missing(status: u16, body: &str) -> bool {
    status == 404 || body.contains("No thread found")
}

impl OpenAIAssistantsProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        proxy_config: Option<ProxyConfig>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let client = build_http_client(&base_url, proxy_config.as_ref(), Some(REQUEST_TIMEOUT))?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn post(
        &self,
        path: &str,
        payload: serde_json::Value,
        on_thread: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e)
                }
            })?;

        self.check_status(response, on_thread).await
    }

    async fn get(&self, path: &str, on_thread: bool) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e)
                }
            })?;

        self.check_status(response, on_thread).await
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        on_thread: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if on_thread && is_thread_missing(status.as_u16(), &body) {
            return Err(ProviderError::StaleThread);
        }

        warn!(%status, "assistants API rejected request: {}", body);
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message: format!("assistants API returned HTTP {}", status),
        })
    }

    async fn create_thread(&self) -> Result<String, ProviderError> {
        let response = self.post("/threads", json!({}), false).await?;
        let thread: ThreadObject = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed thread object: {}", e)))?;
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), ProviderError> {
        self.post(
            &format!("/threads/{}/messages", thread_id),
            json!({ "role": "user", "content": content }),
            true,
        )
        .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<RunObject, ProviderError> {
        let mut payload = json!({ "assistant_id": assistant_id });
        if let Some(instructions) = instructions {
            if !instructions.is_empty() {
                payload["instructions"] = json!(instructions);
            }
        }

        let response = self
            .post(&format!("/threads/{}/runs", thread_id), payload, true)
            .await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed run object: {}", e)))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, ProviderError> {
        let response = self
            .get(&format!("/threads/{}/runs/{}", thread_id, run_id), true)
            .await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed run object: {}", e)))
    }

    /// Poll the run to a terminal state within the fixed ceiling.
    async fn wait_for_run(
        &self,
        thread_id: &str,
        run: RunObject,
    ) -> Result<RunObject, ProviderError> {
        let mut run = run;

        for _ in 0..MAX_RUN_POLLS {
            match classify_run_status(&run.status) {
                RunDisposition::Completed => return Ok(run),
                RunDisposition::Failed(reason) => {
                    let detail = run
                        .last_error
                        .and_then(|e| e.message)
                        .unwrap_or(reason);
                    return Err(ProviderError::Rejected {
                        status: 502,
                        message: detail,
                    });
                }
                RunDisposition::Pending => {
                    tokio::time::sleep(RUN_POLL_INTERVAL).await;
                    run = self.get_run(thread_id, &run.id).await?;
                }
            }
        }

        debug!(thread_id, run_id = %run.id, "run still pending after poll ceiling");
        Err(ProviderError::Timeout)
    }

    async fn fetch_latest_assistant_message(
        &self,
        thread_id: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .get(
                &format!("/threads/{}/messages?order=desc&limit=1", thread_id),
                true,
            )
            .await?;
        let list: MessageList = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed message list: {}", e)))?;

        let message = list
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .ok_or_else(|| {
                ProviderError::Protocol("run completed without an assistant message".to_string())
            })?;

        let text = message
            .content
            .into_iter()
            .filter_map(|c| c.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("");

        Ok(text)
    }

    /// Best-effort release of the provider-side thread on conversation purge.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(format!("{}/threads/{}", self.base_url, thread_id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(ProviderError::Transport)?;

        // A missing thread is already released.
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(ProviderError::Rejected {
                status: response.status().as_u16(),
                message: format!(
                    "failed to delete thread: HTTP {}",
                    response.status()
                ),
            });
        }

        Ok(())
    }

    /// Run one retrieval turn: ensure thread, submit the newest user turn,
    /// poll the run, fetch the reply.
    async fn run_turn(
        &self,
        request: &CompletionRequest,
    ) -> Result<(Completion, bool), ProviderError> {
        let user_text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .ok_or_else(|| {
                ProviderError::Configuration("request carries no user message".to_string())
            })?;
        let instructions = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let (thread_id, created) = match &request.thread {
            Some(existing) => (existing.clone(), false),
            None => (self.create_thread().await?, true),
        };

        self.add_user_message(&thread_id, &user_text).await?;

        let run = self
            .create_run(&thread_id, &request.model, instructions.as_deref())
            .await?;
        let run = self.wait_for_run(&thread_id, run).await?;

        let content = self.fetch_latest_assistant_message(&thread_id).await?;
        let usage = run.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens.unwrap_or(0),
            output_tokens: u.completion_tokens.unwrap_or(0),
        });

        Ok((
            Completion {
                content,
                usage,
                thread: Some(thread_id),
            },
            created,
        ))
    }
}

#[async_trait]
impl AIProvider for OpenAIAssistantsProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let (completion, _created) = self.run_turn(&request).await?;
        Ok(completion)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<EventStream, ProviderError> {
        // Retrieval runs are not incrementally streamed upstream; the whole
        // reply is surfaced as one delta followed by the usage summary so
        // the relay sees the same event shape as plain completions.
        let provider = self.clone();

        let stream = try_stream! {
            let (completion, created) = provider.run_turn(&request).await?;

            if created {
                if let Some(thread) = &completion.thread {
                    yield ProviderEvent::ThreadCreated(thread.clone());
                }
            }
            if !completion.content.is_empty() {
                yield ProviderEvent::ContentDelta(completion.content);
            }
            yield ProviderEvent::UsageFinal(completion.usage.unwrap_or_default());
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_run_is_terminal() {
        assert_eq!(classify_run_status("completed"), RunDisposition::Completed);
    }

    #[test]
    fn pending_states_keep_polling() {
        for status in ["queued", "in_progress"] {
            assert_eq!(classify_run_status(status), RunDisposition::Pending);
        }
    }

    #[test]
    fn failure_states_are_terminal_errors() {
        for status in ["failed", "expired", "cancelled"] {
            assert!(matches!(
                classify_run_status(status),
                RunDisposition::Failed(_)
            ));
        }
    }

    #[test]
    fn unknown_states_fail_rather_than_hang() {
        assert!(matches!(
            classify_run_status("definitely_new_state"),
            RunDisposition::Failed(_)
        ));
    }

    #[test]
    fn thread_missing_detection() {
        assert!(is_thread_missing(404, ""));
        assert!(is_thread_missing(400, "No thread found with id 'thread_x'"));
        assert!(!is_thread_missing(500, "internal error"));
    }
}
