pub mod config;
pub mod data;
pub mod error;
pub mod generator;
pub mod render;
pub mod routes;
pub mod state;
pub mod storage;

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/subir-archivos", post(routes::upload_handler))
        .route("/generar-certificados", post(routes::generate_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
