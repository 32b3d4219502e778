use axum::{routing::get, Router};

use crate::api;

pub fn assistant_routes() -> Router {
    Router::new()
        .route("/assistants", get(api::assistant::list_assistants))
        .route("/usage", get(api::usage::list_usage))
}
