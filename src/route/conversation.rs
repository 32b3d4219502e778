use axum::{
    routing::{delete, get},
    Router,
};

use crate::api;

pub fn conversation_routes() -> Router {
    Router::new()
        .route(
            "/conversations",
            get(api::conversation::list_conversations).post(api::conversation::create_conversation),
        )
        .route(
            "/conversations/{conversation_id}",
            get(api::conversation::get_conversation)
                .put(api::conversation::update_conversation)
                .delete(api::conversation::delete_conversation),
        )
        .route(
            "/conversations/{conversation_id}/purge",
            delete(api::conversation::purge_conversation),
        )
}
