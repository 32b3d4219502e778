//! Balance checks and post-turn settlement.

use chrono::Utc;
use uuid::Uuid;

use crate::ai::core::TokenUsage;
use crate::database::{get_database_pool, models::UsageLedgerEntry};

/// Advisory pre-flight check. A stale read is acceptable here; `settle` is
/// the only writer of ground truth and is never skipped once tokens are
/// known.
pub async fn has_sufficient_balance(user_id: Uuid, threshold: i64) -> Result<bool, sqlx::Error> {
    let pool = get_database_pool()?;

    let sufficient: Option<bool> =
        sqlx::query_scalar("SELECT token_balance >= $2 FROM users WHERE id = $1")
            .bind(user_id)
            .bind(threshold)
            .fetch_optional(pool.as_ref())
            .await?;

    Ok(sufficient.unwrap_or(false))
}

/// Atomic settlement for one turn: deduct the balance (floored at zero),
/// bump the monthly counter, and append one ledger row. The balance update
/// is a single row-level UPDATE so concurrent turns from the same subject
/// cannot lose writes.
pub async fn settle(
    user_id: Uuid,
    usage: &TokenUsage,
    provider: &str,
) -> Result<(), sqlx::Error> {
    let pool = get_database_pool()?;
    let total = (usage.input_tokens + usage.output_tokens) as i64;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE users
         SET token_balance = GREATEST(token_balance - $2, 0),
             monthly_usage = monthly_usage + $2
         WHERE id = $1",
    )
    .bind(user_id)
    .bind(total)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO usage_ledger (id, user_id, recorded_on, input_tokens, output_tokens, provider)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(Utc::now().date_naive())
    .bind(usage.input_tokens as i64)
    .bind(usage.output_tokens as i64)
    .bind(provider)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Ledger rows for one subject, newest first. Reporting surface.
pub async fn list_usage_for_user(
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<UsageLedgerEntry>, sqlx::Error> {
    let pool = get_database_pool()?;

    sqlx::query_as::<_, UsageLedgerEntry>(
        "SELECT id, user_id, recorded_on, input_tokens, output_tokens, provider
         FROM usage_ledger
         WHERE user_id = $1
         ORDER BY recorded_on DESC, created_at DESC
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool.as_ref())
    .await
}
