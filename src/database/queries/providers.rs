use uuid::Uuid;

use crate::database::{get_database_pool, models::Provider};

pub async fn get_provider_by_id(provider_id: Uuid) -> Result<Option<Provider>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, Provider>(
        "SELECT id, kind, api_key, base_url, enabled, proxy, created_at
         FROM providers
         WHERE id = $1",
    )
    .bind(provider_id)
    .fetch_optional(pool.as_ref())
    .await
}
