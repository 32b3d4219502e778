//! Request/response types and SSE events for the chat surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{Conversation, Message};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Buffered (non-streaming) turn result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: Message,
    pub conversation: Conversation,
    pub tokens_used: i64,
    pub tokens_balance: i64,
}

// ============================================
// SSE event data structures
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct StartData {}

#[derive(Debug, Clone, Serialize)]
pub struct ContentData {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoneData {
    pub message_id: Uuid,
    pub tokens_used: i64,
    pub tokens_balance: i64,
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub message: String,
    pub code: String,
}

// The stream always terminates with exactly one `done` or `error` event;
// transport status is 200 either way because headers are long gone by the
// time a failure can happen.
crate::sse_event_enum! {
    #[derive(Debug, Clone, Serialize)]
    pub enum ChatStreamEvent {
        Start(StartData),
        Content(ContentData),
        Done(DoneData),
        Error(ErrorData),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn conversation() -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            assistant_id: Uuid::new_v4(),
            title: None,
            input_tokens: 0,
            output_tokens: 0,
            upstream_thread_id: None,
            archived: false,
            last_message_at: Utc::now(),
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wire_event_names_match_the_protocol() {
        assert_eq!(ChatStreamEvent::Start(StartData {}).event_name(), "start");
        assert_eq!(
            ChatStreamEvent::Content(ContentData {
                text: "hi".to_string()
            })
            .event_name(),
            "content"
        );
        assert_eq!(
            ChatStreamEvent::Done(DoneData {
                message_id: Uuid::new_v4(),
                tokens_used: 15,
                tokens_balance: 4985,
                conversation: conversation(),
            })
            .event_name(),
            "done"
        );
        assert_eq!(
            ChatStreamEvent::Error(ErrorData {
                message: "boom".to_string(),
                code: "PROVIDER_REJECTED".to_string()
            })
            .event_name(),
            "error"
        );
    }

    #[test]
    fn content_payload_is_plain_text_json() {
        let event = ChatStreamEvent::Content(ContentData {
            text: "Hel".to_string(),
        });
        assert_eq!(event.data(), serde_json::json!({ "text": "Hel" }));
    }
}
