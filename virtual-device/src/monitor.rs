use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Create the router serving the static monitor page
pub fn create_monitor_router(page: PathBuf) -> Router {
    Router::new()
        .route("/", get(serve_page))
        .route("/index.html", get(serve_page))
        .fallback(not_found)
        .with_state(Arc::new(page))
}

async fn serve_page(State(page): State<Arc<PathBuf>>) -> Response {
    match tokio::fs::read(page.as_path()).await {
        Ok(html) => ([(header::CONTENT_TYPE, "text/html")], html).into_response(),
        Err(e) => {
            error!(path = %page.display(), error = %e, "Failed to read web interface");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading web interface").into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}
