use uuid::Uuid;

use crate::database::{get_database_pool, models::Assistant};

const ASSISTANT_COLUMNS: &str = "id, name, description, instructions, provider_id, model, \
     parameters, use_knowledge_base, is_active, created_at, updated_at";

/// All active assistants, newest first. Backing query for the TTL cache.
pub async fn list_active_assistants() -> Result<Vec<Assistant>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Assistant>(&format!(
        "SELECT {ASSISTANT_COLUMNS} FROM assistants WHERE is_active = true ORDER BY created_at DESC"
    ))
    .fetch_all(pool.as_ref())
    .await
}

pub async fn get_active_assistant(assistant_id: Uuid) -> Result<Option<Assistant>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Assistant>(&format!(
        "SELECT {ASSISTANT_COLUMNS} FROM assistants WHERE id = $1 AND is_active = true"
    ))
    .bind(assistant_id)
    .fetch_optional(pool.as_ref())
    .await
}
