use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::config::{ChatParameters, ProviderConfig, RouletteConfig};
use crate::normalize::normalize_items;
use crate::spark::{ChatRequest, ConnectionTarget, StreamSession, Transport, UrlSigner, WsTransport};
use crate::{Result, RouletteError};

/// Turns free-form text into wheel items via the chat service.
///
/// Immutable once built; share it behind an `Arc`. Every call gets its own
/// signed URL, connection and answer buffer.
#[derive(Clone)]
pub struct ItemExtractor {
    signer: UrlSigner,
    transport: Arc<dyn Transport>,
    provider: ProviderConfig,
    chat: ChatParameters,
}

impl ItemExtractor {
    pub fn new(config: RouletteConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let target = ConnectionTarget::parse(&config.provider.url)?;
        let signer = UrlSigner::new(config.provider.credentials.clone(), target);
        Ok(Self {
            signer,
            transport,
            provider: config.provider,
            chat: config.chat,
        })
    }

    /// Extractor talking to the real service over WebSocket
    pub fn from_config(config: RouletteConfig) -> Result<Self> {
        Self::new(config, Arc::new(WsTransport::new()))
    }

    pub fn request_timeout(&self) -> Duration {
        self.provider.request_timeout()
    }

    /// Extract the list of items mentioned in `text`.
    ///
    /// Fails with `InvalidInput` for blank text; upstream, transport and
    /// timeout failures are returned as-is and never retried.
    pub async fn extract_items(&self, text: &str) -> Result<Vec<String>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RouletteError::InvalidInput("text is empty".into()));
        }
        info!(target: "item_extractor", input = %text, "Extracting items");

        let signed = self.signer.sign();
        let request = ChatRequest::extraction(
            &self.provider.credentials.app_id,
            self.provider.uid.as_deref(),
            &self.chat,
            &self.provider.system_prompt,
            text,
        );
        let handle = StreamSession::open(Arc::clone(&self.transport), signed, request);
        debug!(target: "item_extractor", session = handle.id(), "Session opened");

        let answer = handle.wait(self.request_timeout()).await?;
        let items = normalize_items(&answer);
        info!(target: "item_extractor", count = items.len(), items = ?items, "Extracted items");
        Ok(items)
    }
}

/// Synchronous front for callers that do not run inside a tokio runtime.
///
/// Owns a runtime for the session tasks and blocks the calling thread until
/// the session finishes. Calling it from within an async context panics.
pub struct BlockingItemExtractor {
    runtime: Runtime,
    inner: ItemExtractor,
}

impl BlockingItemExtractor {
    pub fn new(inner: ItemExtractor) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("roulette-session")
            .enable_all()
            .build()?;
        Ok(Self { runtime, inner })
    }

    pub fn extract_items(&self, text: &str) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.extract_items(text))
    }
}
