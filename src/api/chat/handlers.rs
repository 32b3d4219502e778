//! Public handlers for the chat surface.

use axum::response::sse::{Event, KeepAlive};
use axum::{
    extract::Path,
    http::StatusCode,
    response::Sse,
    Extension, Json,
};
use futures_util::Stream;
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;
use uuid::Uuid;

use super::streaming::{run_buffered_turn, run_streamed_turn};
use super::types::{ChatStreamEvent, SendMessageRequest, SendMessageResponse, StartData};
use crate::api::errors::{ApiResult, AppError};
use crate::api::middleware::AuthenticatedUser;
use crate::database::models::Message;
use crate::database::queries::chat;

/// Send a message and stream the assistant reply over SSE.
///
/// The transport status is always 200; every failure after this point is an
/// `error` event on the stream.
pub async fn send_message_stream(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = tx.send(ChatStreamEvent::Start(StartData {}));
        run_streamed_turn(tx, auth_user.user, conversation_id, request.content).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok(Event::from(event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Send a message and wait for the full assistant reply.
pub async fn send_message(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let response = run_buffered_turn(&auth_user.user, conversation_id, &request.content).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Conversation history, oldest first.
pub async fn get_conversation_messages(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    match chat::get_conversation_messages(conversation_id, auth_user.user.id).await {
        Ok(messages) => Ok((StatusCode::OK, Json(messages))),
        Err(e) => {
            error!("failed to load messages: {}", e);
            Err(AppError::database_error())
        }
    }
}
