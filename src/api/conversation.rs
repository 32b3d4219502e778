//! Conversation CRUD handlers. The relay owns the interesting writes; this
//! surface is the thin lifecycle around them.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::ai::providers::OpenAIAssistantsProvider;
use crate::api::errors::{ApiResult, AppError};
use crate::api::middleware::AuthenticatedUser;
use crate::database::models::{
    Conversation, ConversationListResponse, CreateConversationRequest, UpdateConversationRequest,
};
use crate::database::queries::{assistants, chat, providers};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

pub async fn list_conversations(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ConversationListResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    match chat::list_conversations(auth_user.user.id, page, per_page).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            error!("failed to list conversations: {}", e);
            Err(AppError::database_error())
        }
    }
}

pub async fn create_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    let assistant = assistants::get_active_assistant(request.assistant_id)
        .await
        .map_err(|e| {
            error!("failed to load assistant: {}", e);
            AppError::database_error()
        })?;
    if assistant.is_none() {
        return Err(AppError::assistant_not_found());
    }

    match chat::create_conversation(request, auth_user.user.id).await {
        Ok(conversation) => Ok((StatusCode::CREATED, Json(conversation))),
        Err(e) => {
            error!("failed to create conversation: {}", e);
            Err(AppError::database_error())
        }
    }
}

pub async fn get_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    match chat::get_conversation_by_id(conversation_id, auth_user.user.id).await {
        Ok(Some(conversation)) => Ok((StatusCode::OK, Json(conversation))),
        Ok(None) => Err(AppError::conversation_not_found()),
        Err(e) => {
            error!("failed to load conversation: {}", e);
            Err(AppError::database_error())
        }
    }
}

pub async fn update_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<UpdateConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    match chat::update_conversation(conversation_id, request, auth_user.user.id).await {
        Ok(Some(conversation)) => Ok((StatusCode::OK, Json(conversation))),
        Ok(None) => Err(AppError::conversation_not_found()),
        Err(e) => {
            error!("failed to update conversation: {}", e);
            Err(AppError::database_error())
        }
    }
}

/// Soft delete; the row and its ledger history survive until purge.
pub async fn delete_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<()> {
    match chat::soft_delete_conversation(conversation_id, auth_user.user.id).await {
        Ok(true) => Ok((StatusCode::NO_CONTENT, ())),
        Ok(false) => Err(AppError::conversation_not_found()),
        Err(e) => {
            error!("failed to delete conversation: {}", e);
            Err(AppError::database_error())
        }
    }
}

/// Hard delete. Releases the provider-side thread first, best effort: a
/// failed release never blocks the purge.
pub async fn purge_conversation(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<()> {
    let conversation = chat::get_conversation_any(conversation_id, auth_user.user.id)
        .await
        .map_err(|e| {
            error!("failed to load conversation: {}", e);
            AppError::database_error()
        })?
        .ok_or_else(AppError::conversation_not_found)?;

    if let Some(thread_id) = &conversation.upstream_thread_id {
        release_upstream_thread(&conversation, thread_id).await;
    }

    match chat::purge_conversation(conversation_id, auth_user.user.id).await {
        Ok(true) => Ok((StatusCode::NO_CONTENT, ())),
        Ok(false) => Err(AppError::conversation_not_found()),
        Err(e) => {
            error!("failed to purge conversation: {}", e);
            Err(AppError::database_error())
        }
    }
}

async fn release_upstream_thread(conversation: &Conversation, thread_id: &str) {
    let assistant = match assistants::get_active_assistant(conversation.assistant_id).await {
        Ok(Some(assistant)) => assistant,
        _ => {
            warn!("assistant missing, leaving upstream thread {} behind", thread_id);
            return;
        }
    };

    let provider = match providers::get_provider_by_id(assistant.provider_id).await {
        Ok(Some(provider)) => provider,
        _ => {
            warn!("provider missing, leaving upstream thread {} behind", thread_id);
            return;
        }
    };

    let client = match OpenAIAssistantsProvider::new(
        provider.api_key,
        provider.base_url,
        provider.proxy,
    ) {
        Ok(client) => client,
        Err(e) => {
            warn!("could not build assistants client to release thread: {}", e);
            return;
        }
    };

    if let Err(e) = client.delete_thread(thread_id).await {
        warn!("failed to release upstream thread {}: {}", thread_id, e);
    }
}
