use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use roulette_core::{ItemExtractor, RouletteError};

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Clone)]
pub struct BridgeState {
    pub extractor: Arc<ItemExtractor>,
}

impl BridgeState {
    pub fn new(extractor: Arc<ItemExtractor>) -> Self {
        Self { extractor }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzeResponse {
    pub items: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// HTTP status the frontend sees for each extraction failure
pub fn status_for(err: &RouletteError) -> StatusCode {
    match err {
        RouletteError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RouletteError::Upstream { .. }
        | RouletteError::Transport(_)
        | RouletteError::Protocol(_) => StatusCode::BAD_GATEWAY,
        RouletteError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RouletteError::Config(_)
        | RouletteError::Serialization(_)
        | RouletteError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

pub fn router(state: BridgeState) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn analyze_handler(
    State(state): State<BridgeState>,
    body: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let text = match body {
        Ok(Json(AnalyzeRequest { text: Some(text) })) => text,
        Ok(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                "Missing 'text' in payload",
            )
        }
        Err(rejection) => {
            warn!(target: "roulette_bridge", error = %rejection, "Rejected /analyze body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                "Missing 'text' in payload",
            );
        }
    };

    info!(target: "roulette_bridge", input = %text.trim(), "Received speech input");
    match state.extractor.extract_items(&text).await {
        Ok(items) => {
            info!(target: "roulette_bridge", items = ?items, "Extracted options");
            (StatusCode::OK, Json(AnalyzeResponse { items })).into_response()
        }
        Err(RouletteError::InvalidInput(_)) => {
            error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT", "Empty text")
        }
        Err(e) => {
            warn!(target: "roulette_bridge", code = e.code(), error = %e, "Extraction failed");
            error_response(status_for(&e), e.code(), e.to_string())
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn start_server(addr: std::net::SocketAddr, extractor: Arc<ItemExtractor>) -> Result<()> {
    let app = router(BridgeState::new(extractor));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "roulette_bridge", %addr, "Starting Roulette Bridge HTTP server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BridgeError::Internal(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "roulette_bridge", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target: "roulette_bridge", "Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RouletteError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RouletteError::Upstream {
                code: 10013,
                message: "audit".into(),
                sid: None
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&RouletteError::Transport("reset".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&RouletteError::Timeout(Duration::from_secs(30))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&RouletteError::Config("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
