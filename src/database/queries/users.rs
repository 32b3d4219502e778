use uuid::Uuid;

use crate::database::{get_database_pool, models::User};

pub async fn get_user_by_id(user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, User>(
        "SELECT id, email, token_balance, monthly_usage, is_admin, created_at
         FROM users
         WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await
}

pub async fn get_token_balance(user_id: Uuid) -> Result<i64, sqlx::Error> {
    let pool = get_database_pool()?;

    let balance: Option<i64> =
        sqlx::query_scalar("SELECT token_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool.as_ref())
            .await?;

    Ok(balance.unwrap_or(0))
}
