//! REST API server for linking form workbooks
//!
//! `POST /process-excel/` takes a multipart upload (field `file`), runs it
//! through the sheetlink pipeline and answers with the processed workbook.

pub mod config;
pub mod error;
pub mod handlers;
pub mod types;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use sheetlink_core::Processor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use config::{AppConfig, ServerConfig};
pub use error::ApiError;
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<Processor>,
    pub public_url: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            processor: Arc::new(Processor::with_config(config.processor.clone())),
            public_url: config.server.public_url.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/docs", get(docs))
        .route("/health", get(health_check))
        .route("/process-excel/", post(process_excel))
        .route("/process-excel", post(process_excel))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state)).await
}

/// Start the API server
pub async fn start_server(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_config() {
        let mut config = AppConfig::default();
        config.processor.output_prefix = "linked_".to_string();
        config.server.max_upload_bytes = 1024;

        let state = AppState::new(&config);
        assert_eq!(state.processor.output_filename("a.xlsx"), "linked_a.xlsx");
        assert_eq!(state.max_upload_bytes, 1024);
        assert_eq!(state.public_url, "http://localhost:8000");
    }
}
