mod auth;
mod handlers;
mod routes;

use std::sync::Arc;

use axum::{Router, routing::any};

use crate::server::AppState;

/// Smart and dumb HTTP transports. Paths are matched against the git route
/// table inside the handler, so one catch-all route is enough.
pub fn git_router() -> Router<Arc<AppState>> {
    Router::new().route("/{*path}", any(handlers::dispatch))
}
