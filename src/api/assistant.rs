//! Read surface for active assistants, served from the TTL cache.

use axum::{http::StatusCode, Json};
use tracing::error;

use crate::api::errors::{ApiResult, AppError};
use crate::cache;
use crate::database::models::Assistant;

pub async fn list_assistants() -> ApiResult<Json<Vec<Assistant>>> {
    match cache::active_assistants().await {
        Ok(assistants) => Ok((StatusCode::OK, Json(assistants))),
        Err(e) => {
            error!("failed to load assistants: {}", e);
            Err(AppError::database_error())
        }
    }
}
