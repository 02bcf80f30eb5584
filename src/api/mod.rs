// HTTP surface of the demo application

pub mod handlers;
pub mod middleware;
pub mod responses;

use crate::sinks::guard::SinkGuard;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub guard: SinkGuard,
    pub upload_dir: PathBuf,
}

/// Build the demo router with the request binder and the observability
/// layers applied.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/exec", post(handlers::exec))
        .route("/query", post(handlers::query))
        .route("/fetch", post(handlers::fetch))
        .route("/template", post(handlers::template))
        .layer(axum::middleware::from_fn(middleware::taint_binder))
        .layer(middleware::tracing_layer())
        .layer(middleware::body_size_limit_layer())
        .with_state(state)
}
