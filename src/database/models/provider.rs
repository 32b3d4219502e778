use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::ai::core::ProxyConfig;

/// A configured upstream LLM backend. Credentials are admin-managed and
/// read-only to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub kind: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub enabled: bool,
    pub proxy: Option<ProxyConfig>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, sqlx::postgres::PgRow> for Provider {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let proxy: Option<serde_json::Value> = row.try_get("proxy")?;
        Ok(Provider {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            api_key: row.try_get("api_key")?,
            base_url: row.try_get("base_url")?,
            enabled: row.try_get("enabled")?,
            proxy: proxy.and_then(|v| serde_json::from_value(v).ok()),
            created_at: row.try_get("created_at")?,
        })
    }
}
