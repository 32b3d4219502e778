use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// Append-only usage record, one row per completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recorded_on: NaiveDate,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub provider: String,
}

impl FromRow<'_, sqlx::postgres::PgRow> for UsageLedgerEntry {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UsageLedgerEntry {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            recorded_on: row.try_get("recorded_on")?,
            input_tokens: row.try_get("input_tokens")?,
            output_tokens: row.try_get("output_tokens")?,
            provider: row.try_get("provider")?,
        })
    }
}
