//! Usage-ledger read surface for the authenticated subject.

use axum::{extract::Query, http::StatusCode, Extension, Json};
use serde::Deserialize;
use tracing::error;

use crate::api::errors::{ApiResult, AppError};
use crate::api::middleware::AuthenticatedUser;
use crate::database::models::UsageLedgerEntry;
use crate::database::queries::usage;

#[derive(Debug, Deserialize)]
pub struct UsageParams {
    pub limit: Option<i64>,
}

pub async fn list_usage(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Query(params): Query<UsageParams>,
) -> ApiResult<Json<Vec<UsageLedgerEntry>>> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    match usage::list_usage_for_user(auth_user.user.id, limit).await {
        Ok(entries) => Ok((StatusCode::OK, Json(entries))),
        Err(e) => {
            error!("failed to load usage ledger: {}", e);
            Err(AppError::database_error())
        }
    }
}
