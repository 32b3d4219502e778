//! Conversation and message persistence.
//!
//! The turn lifecycle helpers (`start_turn`, `complete_turn`, `abort_turn`,
//! `ensure_title`) are the only writers of conversation state during a relay
//! turn; the streaming layer calls each of them at most once per turn.

use chrono::Utc;
use uuid::Uuid;

use crate::ai::core::TokenUsage;
use crate::database::{
    get_database_pool,
    models::{
        Conversation, ConversationListResponse, CreateConversationRequest, Message,
        UpdateConversationRequest,
    },
};

const CONVERSATION_COLUMNS: &str = "id, user_id, assistant_id, title, input_tokens, \
     output_tokens, upstream_thread_id, archived, last_message_at, deleted_at, created_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, input_tokens, output_tokens, created_at";

pub async fn create_conversation(
    request: CreateConversationRequest,
    user_id: Uuid,
) -> Result<Conversation, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Conversation>(&format!(
        "INSERT INTO conversations (id, user_id, assistant_id, title)
         VALUES ($1, $2, $3, $4)
         RETURNING {CONVERSATION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(request.assistant_id)
    .bind(request.title)
    .fetch_one(pool.as_ref())
    .await
}

/// Fetch a conversation owned by `user_id`. Soft-deleted rows are invisible.
pub async fn get_conversation_by_id(
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
    ))
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await
}

/// Like `get_conversation_by_id` but including soft-deleted rows; used by
/// the purge path.
pub async fn get_conversation_any(
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE id = $1 AND user_id = $2"
    ))
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await
}

pub async fn list_conversations(
    user_id: Uuid,
    page: i32,
    per_page: i32,
) -> Result<ConversationListResponse, sqlx::Error> {
    let pool = get_database_pool()?;
    let offset = (page - 1).max(0) * per_page;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conversations WHERE user_id = $1 AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool.as_ref())
    .await?;

    let conversations = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE user_id = $1 AND deleted_at IS NULL
         ORDER BY last_message_at DESC
         LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(per_page as i64)
    .bind(offset as i64)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(ConversationListResponse {
        conversations,
        total,
        page,
        per_page,
    })
}

pub async fn update_conversation(
    conversation_id: Uuid,
    request: UpdateConversationRequest,
    user_id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Conversation>(&format!(
        "UPDATE conversations
         SET title = COALESCE($3, title),
             archived = COALESCE($4, archived)
         WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
         RETURNING {CONVERSATION_COLUMNS}"
    ))
    .bind(conversation_id)
    .bind(user_id)
    .bind(request.title)
    .bind(request.archived)
    .fetch_optional(pool.as_ref())
    .await
}

/// Soft delete: the row stays behind for ledger joins until purged.
pub async fn soft_delete_conversation(
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let pool = get_database_pool()?;

    let result = sqlx::query(
        "UPDATE conversations SET deleted_at = $3
         WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool.as_ref())
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Hard delete. The caller is responsible for releasing the upstream thread
/// first; this only removes local rows.
pub async fn purge_conversation(conversation_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let pool = get_database_pool()?;
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Conversation history in chronological order.
pub async fn get_conversation_messages(
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<Message>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Message>(&format!(
        "SELECT m.{} FROM messages m
         JOIN conversations c ON c.id = m.conversation_id
         WHERE m.conversation_id = $1 AND c.user_id = $2 AND c.deleted_at IS NULL
         ORDER BY m.created_at ASC, m.id ASC",
        MESSAGE_COLUMNS.replace(", ", ", m.")
    ))
    .bind(conversation_id)
    .bind(user_id)
    .fetch_all(pool.as_ref())
    .await
}

/// Persist the user message before the provider call so the turn is durable
/// even if the process dies mid-stream.
pub async fn start_turn(conversation_id: Uuid, content: &str) -> Result<Message, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Message>(&format!(
        "INSERT INTO messages (id, conversation_id, role, content)
         VALUES ($1, $2, 'user', $3)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(content)
    .fetch_one(pool.as_ref())
    .await
}

/// Persist the assistant reply and roll the conversation counters forward as
/// one unit.
pub async fn complete_turn(
    conversation_id: Uuid,
    content: &str,
    usage: &TokenUsage,
) -> Result<Message, sqlx::Error> {
    let pool = get_database_pool()?;
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, Message>(&format!(
        "INSERT INTO messages (id, conversation_id, role, content, input_tokens, output_tokens)
         VALUES ($1, $2, 'assistant', $3, $4, $5)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(content)
    .bind(usage.input_tokens as i64)
    .bind(usage.output_tokens as i64)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE conversations
         SET input_tokens = input_tokens + $2,
             output_tokens = output_tokens + $3,
             last_message_at = $4
         WHERE id = $1",
    )
    .bind(conversation_id)
    .bind(usage.input_tokens as i64)
    .bind(usage.output_tokens as i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(message)
}

/// Remove the user message of a turn that never produced assistant output.
pub async fn abort_turn(user_message_id: Uuid) -> Result<(), sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query("DELETE FROM messages WHERE id = $1 AND role = 'user'")
        .bind(user_message_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

/// First-write-wins title assignment. The conditional update makes two
/// concurrent first turns converge on a single title.
pub async fn ensure_title(conversation_id: Uuid, first_user_text: &str) -> Result<(), sqlx::Error> {
    let pool = get_database_pool()?;
    let title = truncate_title(first_user_text);

    sqlx::query("UPDATE conversations SET title = $2 WHERE id = $1 AND title IS NULL")
        .bind(conversation_id)
        .bind(title)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

pub async fn set_upstream_thread(
    conversation_id: Uuid,
    thread_id: &str,
) -> Result<(), sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query("UPDATE conversations SET upstream_thread_id = $2 WHERE id = $1")
        .bind(conversation_id)
        .bind(thread_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

/// Drop a stale provider-side thread handle so the next turn recreates it.
pub async fn clear_upstream_thread(conversation_id: Uuid) -> Result<(), sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query("UPDATE conversations SET upstream_thread_id = NULL WHERE id = $1")
        .bind(conversation_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

/// Title candidate from the opening user message: first 50 characters on a
/// character boundary, whitespace collapsed at the edges.
pub fn truncate_title(text: &str) -> String {
    text.trim().chars().take(50).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::truncate_title;

    #[test]
    fn title_is_capped_at_fifty_chars() {
        let long = "a".repeat(80);
        assert_eq!(truncate_title(&long).chars().count(), 50);
    }

    #[test]
    fn title_keeps_short_text_intact() {
        assert_eq!(truncate_title("hello there"), "hello there");
    }

    #[test]
    fn title_respects_multibyte_boundaries() {
        let text = "ü".repeat(60);
        let title = truncate_title(&text);
        assert_eq!(title.chars().count(), 50);
        assert!(title.chars().all(|c| c == 'ü'));
    }

    #[test]
    fn title_trims_surrounding_whitespace() {
        assert_eq!(truncate_title("  hi  "), "hi");
    }
}
