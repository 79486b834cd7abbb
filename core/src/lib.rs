// Roulette Core Library
// Signed streaming bridge to the Spark chat service and item extraction

pub mod config;
pub mod extractor;
pub mod normalize;
pub mod spark;
pub mod telemetry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Export core types
pub use config::{ChatParameters, Credentials, ProviderConfig, RouletteConfig};
pub use extractor::{BlockingItemExtractor, ItemExtractor};
pub use normalize::normalize_items;
pub use spark::{
    Chunk, ConnectionTarget, Connection, ResponseAccumulator, SessionHandle, SessionState,
    SignedRequest, StreamSession, Transport, UrlSigner, WsTransport,
};

use std::time::Duration;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouletteError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream error {code}: {message}")]
    Upstream {
        code: i64,
        message: String,
        sid: Option<String>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No final chunk within {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouletteError {
    /// Stable error code for callers that map failures onto responses
    pub fn code(&self) -> &'static str {
        match self {
            RouletteError::InvalidInput(_) => "INVALID_INPUT",
            RouletteError::Upstream { .. } => "UPSTREAM_ERROR",
            RouletteError::Transport(_) => "TRANSPORT_ERROR",
            RouletteError::Timeout(_) => "TIMEOUT",
            RouletteError::Protocol(_) => "PROTOCOL_ERROR",
            RouletteError::Config(_) => "CONFIG_ERROR",
            RouletteError::Serialization(_) => "SERIALIZATION_ERROR",
            RouletteError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RouletteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RouletteError::InvalidInput("x".into()).code(),
            "INVALID_INPUT"
        );
        assert_eq!(
            RouletteError::Upstream {
                code: 10013,
                message: "bad".into(),
                sid: None
            }
            .code(),
            "UPSTREAM_ERROR"
        );
        assert_eq!(
            RouletteError::Timeout(Duration::from_secs(1)).code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn test_upstream_display_carries_code() {
        let e = RouletteError::Upstream {
            code: 11200,
            message: "auth failed".into(),
            sid: Some("cht000".into()),
        };
        assert_eq!(e.to_string(), "Upstream error 11200: auth failed");
    }
}
