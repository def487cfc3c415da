use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::git::git_router;
use crate::access::{AccessPolicy, StoreAccessPolicy};
use crate::git::GitRunner;
use crate::hooks::PushObserver;
use crate::store::Store;

/// Shared by the HTTP router and the SSH server.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub access: Arc<dyn AccessPolicy>,
    pub git: GitRunner,
    /// Directory holding `<name>.git` bare repositories.
    pub repo_root: PathBuf,
    pub observer: Arc<dyn PushObserver>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        git: GitRunner,
        repo_root: PathBuf,
        observer: Arc<dyn PushObserver>,
    ) -> Self {
        let access = Arc::new(StoreAccessPolicy::new(Arc::clone(&store)));
        Self {
            store,
            access,
            git,
            repo_root,
            observer,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/git", git_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
