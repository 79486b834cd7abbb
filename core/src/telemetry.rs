// Logging setup shared by the binaries
use tracing_subscriber::EnvFilter;

/// Event targets are component names rather than module paths, so filter
/// directives name them directly (`RUST_LOG=stream_session=debug`).
pub const DEFAULT_LOG_FILTER: &str =
    "warn,config=info,signer=info,ws_transport=info,stream_session=info,item_extractor=info,roulette_bridge=info";

/// Install the global fmt subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `DEFAULT_LOG_FILTER`.
/// Returns false if a subscriber was already installed.
pub fn init_logging() -> bool {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init()
        .is_ok()
}
