use axum::{routing::post, Router};

use crate::api;

pub fn chat_routes() -> Router {
    Router::new()
        .route(
            "/conversations/{conversation_id}/messages",
            post(api::chat::send_message).get(api::chat::get_conversation_messages),
        )
        .route(
            "/conversations/{conversation_id}/messages/stream",
            post(api::chat::send_message_stream),
        )
}
