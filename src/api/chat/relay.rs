//! The per-turn streaming relay.
//!
//! `drive_stream` consumes a provider event stream and forwards content to
//! the caller's SSE channel while accumulating the full response. It is
//! deliberately free of persistence: it returns exactly one `TurnOutcome`,
//! and the caller runs exactly one bookkeeping pass against it.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::StreamExt;
use uuid::Uuid;

use super::types::{ChatStreamEvent, ContentData};
use crate::ai::core::{EventStream, ProviderError, ProviderEvent, TokenUsage};

/// Ceiling for one whole turn, sized for the slowest knowledge-base path.
pub const TURN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Pending,
    /// Provider call dispatched, no content yet.
    Thinking,
    /// At least one non-empty delta has been forwarded.
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayState::Completed | RelayState::Cancelled | RelayState::Failed
        )
    }
}

/// Transient per-turn accumulator. Never persisted; dropped once the
/// terminal bookkeeping pass has run.
#[derive(Debug)]
pub struct StreamSession {
    pub correlation_id: Uuid,
    pub content: String,
    pub usage: Option<TokenUsage>,
    /// Upstream thread handle the provider created during this turn.
    pub created_thread: Option<String>,
    pub state: RelayState,
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            content: String::new(),
            usage: None,
            created_thread: None,
            state: RelayState::Pending,
        }
    }

    pub fn has_output(&self) -> bool {
        !self.content.is_empty() || self.usage.is_some()
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

/// How one turn ended. Exactly one of these is produced per turn.
#[derive(Debug)]
pub enum TurnOutcome {
    Completed,
    /// The caller stopped listening; bookkeeping still runs.
    Cancelled,
    Failed(ProviderError),
}

/// Drive the provider stream to a terminal state.
///
/// Increments are forwarded in arrival order; zero-length deltas are
/// skipped. A stream that ends without a usage frame is a failure so the
/// caller is never left hanging without a terminal event.
pub async fn drive_stream(
    mut events: EventStream,
    tx: &UnboundedSender<ChatStreamEvent>,
    session: &mut StreamSession,
    deadline: Duration,
) -> TurnOutcome {
    let timeout = tokio::time::sleep(deadline);
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            _ = &mut timeout => {
                session.state = RelayState::Failed;
                return TurnOutcome::Failed(ProviderError::Timeout);
            }
            event = events.next() => match event {
                Some(Ok(ProviderEvent::ContentDelta(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    if session.state != RelayState::Streaming {
                        session.state = RelayState::Streaming;
                    }
                    session.content.push_str(&text);
                    // A failed send means the receiver is gone: the caller
                    // disconnected. Dropping `events` aborts the upstream
                    // call.
                    if tx.send(ChatStreamEvent::Content(ContentData { text })).is_err() {
                        session.state = RelayState::Cancelled;
                        return TurnOutcome::Cancelled;
                    }
                }
                Some(Ok(ProviderEvent::ThreadCreated(thread_id))) => {
                    session.created_thread = Some(thread_id);
                }
                Some(Ok(ProviderEvent::UsageFinal(usage))) => {
                    session.usage = Some(usage);
                    session.state = RelayState::Completed;
                    return TurnOutcome::Completed;
                }
                Some(Err(e)) => {
                    session.state = RelayState::Failed;
                    return TurnOutcome::Failed(e);
                }
                None => {
                    session.state = RelayState::Failed;
                    return TurnOutcome::Failed(ProviderError::Protocol(
                        "response stream ended without a terminal usage frame".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio::sync::mpsc::unbounded_channel;

    fn events_from(items: Vec<Result<ProviderEvent, ProviderError>>) -> EventStream {
        Box::pin(stream::iter(items))
    }

    fn usage(input: u32, output: u32) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[tokio::test]
    async fn completed_stream_accumulates_and_forwards_in_order() {
        let events = events_from(vec![
            Ok(ProviderEvent::ContentDelta("Hel".to_string())),
            Ok(ProviderEvent::ContentDelta("lo".to_string())),
            Ok(ProviderEvent::UsageFinal(usage(10, 5))),
        ]);
        let (tx, mut rx) = unbounded_channel();
        let mut session = StreamSession::new();
        session.state = RelayState::Thinking;

        let outcome = drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

        assert!(matches!(outcome, TurnOutcome::Completed));
        assert_eq!(session.state, RelayState::Completed);
        assert_eq!(session.content, "Hello");
        assert_eq!(session.usage, Some(usage(10, 5)));

        let mut forwarded = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ChatStreamEvent::Content(data) = event {
                forwarded.push(data.text);
            }
        }
        assert_eq!(forwarded, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn empty_deltas_are_skipped() {
        let events = events_from(vec![
            Ok(ProviderEvent::ContentDelta(String::new())),
            Ok(ProviderEvent::ContentDelta("hi".to_string())),
            Ok(ProviderEvent::ContentDelta(String::new())),
            Ok(ProviderEvent::UsageFinal(usage(1, 1))),
        ]);
        let (tx, mut rx) = unbounded_channel();
        let mut session = StreamSession::new();

        drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ChatStreamEvent::Content(_)) {
                count += 1;
            }
        }
        assert_eq!(count, 1);
        assert_eq!(session.content, "hi");
    }

    #[tokio::test]
    async fn provider_error_fails_the_turn_but_keeps_partial_content() {
        let events = events_from(vec![
            Ok(ProviderEvent::ContentDelta("par".to_string())),
            Err(ProviderError::Rejected {
                status: 500,
                message: "upstream blew up".to_string(),
            }),
        ]);
        let (tx, _rx) = unbounded_channel();
        let mut session = StreamSession::new();

        let outcome = drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

        assert!(matches!(outcome, TurnOutcome::Failed(ProviderError::Rejected { .. })));
        assert_eq!(session.state, RelayState::Failed);
        assert_eq!(session.content, "par");
        assert!(session.usage.is_none());
    }

    #[tokio::test]
    async fn stream_ending_without_usage_frame_is_a_failure() {
        let events = events_from(vec![Ok(ProviderEvent::ContentDelta("tail".to_string()))]);
        let (tx, _rx) = unbounded_channel();
        let mut session = StreamSession::new();

        let outcome = drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

        assert!(matches!(outcome, TurnOutcome::Failed(ProviderError::Protocol(_))));
        assert_eq!(session.content, "tail");
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_the_turn_with_partial_content() {
        let events = events_from(vec![
            Ok(ProviderEvent::ContentDelta("Hel".to_string())),
            Ok(ProviderEvent::ContentDelta("lo".to_string())),
            Ok(ProviderEvent::UsageFinal(usage(10, 5))),
        ]);
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let mut session = StreamSession::new();

        let outcome = drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

        assert!(matches!(outcome, TurnOutcome::Cancelled));
        assert_eq!(session.state, RelayState::Cancelled);
        // The first delta was accumulated before the failed send was
        // detected; the partial response is preserved for bookkeeping.
        assert_eq!(session.content, "Hel");
        assert!(session.usage.is_none());
    }

    #[tokio::test]
    async fn thread_created_is_captured_not_forwarded() {
        let events = events_from(vec![
            Ok(ProviderEvent::ThreadCreated("thread_abc".to_string())),
            Ok(ProviderEvent::ContentDelta("hi".to_string())),
            Ok(ProviderEvent::UsageFinal(usage(2, 2))),
        ]);
        let (tx, mut rx) = unbounded_channel();
        let mut session = StreamSession::new();

        drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

        assert_eq!(session.created_thread.as_deref(), Some("thread_abc"));
        let mut content_events = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, ChatStreamEvent::Content(_)));
            content_events += 1;
        }
        assert_eq!(content_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_hits_the_turn_deadline() {
        let events: EventStream = Box::pin(stream::pending());
        let (tx, _rx) = unbounded_channel();
        let mut session = StreamSession::new();

        let outcome = drive_stream(events, &tx, &mut session, Duration::from_secs(300)).await;

        assert!(matches!(outcome, TurnOutcome::Failed(ProviderError::Timeout)));
        assert_eq!(session.state, RelayState::Failed);
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(RelayState::Completed.is_terminal());
        assert!(RelayState::Cancelled.is_terminal());
        assert!(RelayState::Failed.is_terminal());
        assert!(!RelayState::Streaming.is_terminal());
        assert!(!RelayState::Thinking.is_terminal());
        assert!(!RelayState::Pending.is_terminal());
    }
}
