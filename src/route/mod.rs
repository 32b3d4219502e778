mod assistant;
mod chat;
mod conversation;

use axum::{middleware, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::api;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_rest_router() -> Router {
    let protected_routes = Router::new()
        .merge(conversation::conversation_routes())
        .merge(chat::chat_routes())
        .merge(assistant::assistant_routes())
        .layer(middleware::from_fn(api::middleware::auth_middleware));

    let api_routes = Router::new()
        .route("/health", get(health))
        .merge(protected_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
