use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// Sampling and context parameters stored per assistant as JSON.
///
/// Every field is optional; the provider layer fills in defaults and the
/// capability table decides which parameters are actually sent upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelParameters {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub response_format: Option<String>,
    /// Number of prior conversation turns included in the context.
    pub context_window: Option<u32>,
    pub reasoning_effort: Option<String>,
    /// Append the fixed safety clause to the system prompt.
    pub safety_prompt: Option<bool>,
}

/// Admin-configured assistant. Read-only to the relay; served through the
/// process-wide TTL cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub provider_id: Uuid,
    /// Model identifier at the provider. In knowledge-base mode this holds
    /// the upstream assistant id instead of a raw model name.
    pub model: String,
    pub parameters: ModelParameters,
    pub use_knowledge_base: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, sqlx::postgres::PgRow> for Assistant {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let parameters: Option<serde_json::Value> = row.try_get("parameters")?;
        Ok(Assistant {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            instructions: row.try_get("instructions")?,
            provider_id: row.try_get("provider_id")?,
            model: row.try_get("model")?,
            parameters: parameters
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default(),
            use_knowledge_base: row.try_get("use_knowledge_base")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
