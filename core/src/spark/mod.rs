//! Spark chat service client: signed URLs, wire format, and streaming sessions
//!
//! - `signer`: `UrlSigner` producing time-scoped `SignedRequest`s
//! - `protocol`: request payload and inbound frame decoding into `Chunk`s
//! - `accumulator`: per-session append-only answer buffer
//! - `session`: `StreamSession` task and the caller's `SessionHandle`
//! - `transport`: `Transport`/`Connection` seam and the WebSocket implementation

mod accumulator;
mod protocol;
mod session;
mod signer;
mod transport;

pub use accumulator::ResponseAccumulator;
pub use protocol::{ChatMessage, ChatRequest, Chunk, TokenUsage, STATUS_FINAL};
pub use session::{SessionHandle, SessionState, StreamSession};
pub use signer::{ConnectionTarget, SignedRequest, UrlSigner};
pub use transport::{Connection, Transport, WsTransport};
