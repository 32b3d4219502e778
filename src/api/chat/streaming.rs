//! Turn orchestration: pre-flight checks, provider dispatch, and the single
//! bookkeeping pass that follows every terminal relay state.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::context::build_context;
use super::relay::{drive_stream, RelayState, StreamSession, TurnOutcome, TURN_TIMEOUT};
use super::turn_guard::try_begin_turn;
use super::types::{ChatStreamEvent, DoneData, ErrorData, SendMessageResponse};
use crate::ai::core::{CompletionRequest, ProviderError};
use crate::ai::factory;
use crate::api::errors::AppError;
use crate::cache;
use crate::database::models::{Assistant, Conversation, Message, Provider, User};
use crate::database::queries::{chat, providers, usage, users};

fn send_event(tx: &UnboundedSender<ChatStreamEvent>, event: ChatStreamEvent) {
    let _ = tx.send(event);
}

fn send_error(tx: &UnboundedSender<ChatStreamEvent>, err: &AppError) {
    send_event(
        tx,
        ChatStreamEvent::Error(ErrorData {
            message: err.to_string(),
            code: err.code().as_str().to_string(),
        }),
    );
}

/// Everything resolved before the provider is called. Pre-flight failures
/// carry no side effects: no message exists yet and nothing is billed.
struct TurnSetup {
    conversation: Conversation,
    assistant: Assistant,
    provider: Provider,
    history: Vec<Message>,
}

async fn prepare_turn(user: &User, conversation_id: Uuid) -> Result<TurnSetup, AppError> {
    let conversation = chat::get_conversation_by_id(conversation_id, user.id)
        .await
        .map_err(|e| {
            error!("failed to load conversation: {}", e);
            AppError::database_error()
        })?
        .ok_or_else(AppError::conversation_not_found)?;

    let assistant = cache::get_active_assistant(conversation.assistant_id)
        .await
        .map_err(|e| {
            error!("failed to load assistant: {}", e);
            AppError::database_error()
        })?
        .ok_or_else(AppError::assistant_not_found)?;

    let provider = providers::get_provider_by_id(assistant.provider_id)
        .await
        .map_err(|e| {
            error!("failed to load provider: {}", e);
            AppError::database_error()
        })?
        .ok_or_else(|| AppError::from(&ProviderError::Configuration("provider row missing".to_string())))?;

    // Advisory balance check. Settlement is the source of truth; this only
    // stops obviously broke accounts before any provider spend.
    let sufficient = usage::has_sufficient_balance(user.id, *crate::MIN_BALANCE_THRESHOLD)
        .await
        .map_err(|e| {
            error!("balance check failed: {}", e);
            AppError::database_error()
        })?;
    if !sufficient {
        return Err(AppError::quota_exceeded());
    }

    let history = chat::get_conversation_messages(conversation_id, user.id)
        .await
        .map_err(|e| {
            error!("failed to load history: {}", e);
            AppError::database_error()
        })?;

    Ok(TurnSetup {
        conversation,
        assistant,
        provider,
        history,
    })
}

fn completion_request(setup: &TurnSetup, content: &str) -> CompletionRequest {
    CompletionRequest {
        model: setup.assistant.model.clone(),
        messages: build_context(&setup.assistant, &setup.history, content),
        parameters: setup.assistant.parameters.clone(),
        thread: setup.conversation.upstream_thread_id.clone(),
    }
}

/// The turn never produced assistant output: remove the dangling user
/// message so the conversation has no unanswered turn.
async fn rollback_user_message(user_message: &Message) {
    if let Err(e) = chat::abort_turn(user_message.id).await {
        error!("failed to roll back user message {}: {}", user_message.id, e);
    }
}

async fn handle_provider_failure(conversation: &Conversation, err: &ProviderError) {
    if matches!(err, ProviderError::StaleThread) {
        // Self-heal: drop the dead handle so the next turn recreates the
        // thread. The current turn still fails.
        if let Err(e) = chat::clear_upstream_thread(conversation.id).await {
            error!("failed to clear stale thread handle: {}", e);
        }
    }
}

/// One bookkeeping pass per terminal outcome. Settlement runs whenever the
/// provider produced any output or reported usage, and never otherwise.
async fn finish_turn(
    outcome: &TurnOutcome,
    session: &StreamSession,
    setup: &TurnSetup,
    user: &User,
    user_message: &Message,
) -> Result<Option<Message>, AppError> {
    if let Some(thread_id) = &session.created_thread {
        if let Err(e) = chat::set_upstream_thread(setup.conversation.id, thread_id).await {
            error!("failed to persist upstream thread handle: {}", e);
        }
    }

    if let TurnOutcome::Failed(err) = outcome {
        handle_provider_failure(&setup.conversation, err).await;
    }

    if !session.has_output() {
        rollback_user_message(user_message).await;
        return Ok(None);
    }

    // Content was generated, so the turn is billable even if the stream was
    // cancelled or failed afterwards: persist what exists and settle with
    // whatever usage is known.
    let usage_totals = session.usage.unwrap_or_default();
    let assistant_message = chat::complete_turn(setup.conversation.id, &session.content, &usage_totals)
        .await
        .map_err(|e| {
            error!("failed to persist assistant message: {}", e);
            AppError::database_error()
        })?;

    let is_first_turn = !setup.history.iter().any(|m| m.role == "user");
    if matches!(outcome, TurnOutcome::Completed) && is_first_turn {
        if let Err(e) = chat::ensure_title(setup.conversation.id, &user_message.content).await {
            warn!("failed to set conversation title: {}", e);
        }
    }

    if let Err(e) = usage::settle(user.id, &usage_totals, &setup.provider.kind).await {
        // The message is persisted but the ledger write failed; this must
        // be loud because it is the one invariant we cannot retry safely.
        error!(
            "settlement failed for user {} conversation {}: {}",
            user.id, setup.conversation.id, e
        );
        return Err(AppError::database_error());
    }

    Ok(Some(assistant_message))
}

/// Run one streamed turn end to end. Every exit emits exactly one terminal
/// SSE event unless the caller is already gone.
pub(super) async fn run_streamed_turn(
    tx: UnboundedSender<ChatStreamEvent>,
    user: User,
    conversation_id: Uuid,
    content: String,
) {
    let Some(_guard) = try_begin_turn(conversation_id) else {
        send_error(&tx, &AppError::turn_in_flight());
        return;
    };

    let setup = match prepare_turn(&user, conversation_id).await {
        Ok(setup) => setup,
        Err(err) => {
            send_error(&tx, &err);
            return;
        }
    };

    let client = match factory::create_provider(&setup.provider, &setup.assistant) {
        Ok(client) => client,
        Err(e) => {
            warn!("provider dispatch failed: {}", e);
            send_error(&tx, &AppError::from(&e));
            return;
        }
    };

    let request = completion_request(&setup, &content);

    let user_message = match chat::start_turn(conversation_id, &content).await {
        Ok(message) => message,
        Err(e) => {
            error!("failed to persist user message: {}", e);
            send_error(&tx, &AppError::database_error());
            return;
        }
    };

    let mut session = StreamSession::new();
    session.state = RelayState::Thinking;
    debug!(
        correlation_id = %session.correlation_id,
        conversation_id = %conversation_id,
        "relay turn started"
    );

    let events = match client.stream(request).await {
        Ok(events) => events,
        Err(e) => {
            // The provider call never started producing output.
            handle_provider_failure(&setup.conversation, &e).await;
            rollback_user_message(&user_message).await;
            send_error(&tx, &AppError::from(&e));
            return;
        }
    };

    let outcome = drive_stream(events, &tx, &mut session, TURN_TIMEOUT).await;

    let finished = finish_turn(&outcome, &session, &setup, &user, &user_message).await;

    match (&outcome, finished) {
        (TurnOutcome::Completed, Ok(Some(assistant_message))) => {
            let tokens_balance = users::get_token_balance(user.id).await.unwrap_or(0);
            let conversation = chat::get_conversation_by_id(conversation_id, user.id)
                .await
                .ok()
                .flatten()
                .unwrap_or(setup.conversation);

            send_event(
                &tx,
                ChatStreamEvent::Done(DoneData {
                    message_id: assistant_message.id,
                    tokens_used: session.usage.unwrap_or_default().total() as i64,
                    tokens_balance,
                    conversation,
                }),
            );
        }
        (TurnOutcome::Completed, Ok(None)) => {
            // Completed without content or usage: nothing was persisted.
            send_error(
                &tx,
                &AppError::from(&ProviderError::Protocol(
                    "provider completed without output".to_string(),
                )),
            );
        }
        (TurnOutcome::Cancelled, _) => {
            // Nobody is listening; bookkeeping already ran.
        }
        (TurnOutcome::Failed(err), _) => {
            send_error(&tx, &AppError::from(err));
        }
        (_, Err(app_err)) => {
            send_error(&tx, &app_err);
        }
    }
}

/// Buffered variant of the same pipeline, used by the non-streaming
/// endpoint. Same lifecycle, same bookkeeping, one JSON response.
pub(super) async fn run_buffered_turn(
    user: &User,
    conversation_id: Uuid,
    content: &str,
) -> Result<SendMessageResponse, AppError> {
    let Some(_guard) = try_begin_turn(conversation_id) else {
        return Err(AppError::turn_in_flight());
    };

    let setup = prepare_turn(user, conversation_id).await?;

    let client = factory::create_provider(&setup.provider, &setup.assistant).map_err(|e| {
        warn!("provider dispatch failed: {}", e);
        AppError::from(&e)
    })?;

    let request = completion_request(&setup, content);

    let user_message = chat::start_turn(conversation_id, content).await.map_err(|e| {
        error!("failed to persist user message: {}", e);
        AppError::database_error()
    })?;

    let mut session = StreamSession::new();
    session.state = RelayState::Thinking;

    let outcome = match tokio::time::timeout(TURN_TIMEOUT, client.complete(request)).await {
        Ok(Ok(completion)) => {
            session.content = completion.content;
            session.usage = completion.usage;
            if setup.conversation.upstream_thread_id.is_none() {
                session.created_thread = completion.thread;
            }
            session.state = RelayState::Completed;
            TurnOutcome::Completed
        }
        Ok(Err(e)) => {
            session.state = RelayState::Failed;
            TurnOutcome::Failed(e)
        }
        Err(_) => {
            session.state = RelayState::Failed;
            TurnOutcome::Failed(ProviderError::Timeout)
        }
    };

    let finished = finish_turn(&outcome, &session, &setup, user, &user_message).await?;

    match (outcome, finished) {
        (TurnOutcome::Completed, Some(assistant_message)) => {
            let tokens_balance = users::get_token_balance(user.id).await.unwrap_or(0);
            let conversation = chat::get_conversation_by_id(conversation_id, user.id)
                .await
                .ok()
                .flatten()
                .unwrap_or(setup.conversation);

            Ok(SendMessageResponse {
                tokens_used: session.usage.unwrap_or_default().total() as i64,
                tokens_balance,
                message: assistant_message,
                conversation,
            })
        }
        (TurnOutcome::Completed, None) => Err(AppError::from(&ProviderError::Protocol(
            "provider completed without output".to_string(),
        ))),
        (TurnOutcome::Failed(err), _) => Err(AppError::from(&err)),
        (TurnOutcome::Cancelled, _) => {
            // The buffered path has no client channel to lose.
            Err(AppError::internal_error("turn cancelled"))
        }
    }
}
