//! Router assembly.

use crate::routes;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/tabs", get(routes::tabs::list))
        .route("/settings", get(routes::settings::get).put(routes::settings::put))
        .route("/sites", get(routes::sites::list))
        .route("/sites/custom", post(routes::sites::add_custom))
        .route("/sites/custom/{id}", delete(routes::sites::remove_custom))
        .route("/sites/{key}/enabled", put(routes::sites::set_enabled))
        .route("/notifications/clicked", post(routes::notifications::clicked))
        .route("/health", get(routes::health));

    let ws_routes = Router::new()
        .route("/frames", get(routes::ws::frames))
        .route("/host", get(routes::ws::host));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
