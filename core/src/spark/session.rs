/// Stream session
///
/// Owns one request's lifecycle against the chat service: connect, send the
/// request, fold streamed chunks into a private accumulator, and stop at the
/// first terminal event. The exchange runs on its own tokio task; the caller
/// holds a `SessionHandle` and waits for the single result it produces.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::accumulator::ResponseAccumulator;
use super::protocol::{ChatRequest, Chunk};
use super::signer::SignedRequest;
use super::transport::{Connection, Transport};
use crate::{Result, RouletteError};

/// Upper bound on a graceful close before the connection is simply dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Task-side state of one exchange
pub struct StreamSession {
    id: u64,
    state: watch::Sender<SessionState>,
    buffer: ResponseAccumulator,
}

impl StreamSession {
    /// Start the exchange on a new task and return immediately.
    pub fn open(
        transport: Arc<dyn Transport>,
        signed: SignedRequest,
        request: ChatRequest,
    ) -> SessionHandle {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let session = StreamSession {
            id,
            state: state_tx,
            buffer: ResponseAccumulator::new(),
        };
        tokio::spawn(session.run(transport, signed, request, cancel_rx, result_tx));

        SessionHandle {
            id,
            state: state_rx,
            result: result_rx,
            cancel: Some(cancel_tx),
        }
    }

    async fn run(
        mut self,
        transport: Arc<dyn Transport>,
        signed: SignedRequest,
        request: ChatRequest,
        mut cancel: oneshot::Receiver<Duration>,
        done: oneshot::Sender<Result<String>>,
    ) {
        self.transition(SessionState::Connecting);
        let connected = tokio::select! {
            res = transport.connect(&signed.url) => res,
            reason = &mut cancel => Err(cancelled(reason)),
        };
        let mut conn = match connected {
            Ok(c) => c,
            Err(e) => {
                let _ = done.send(Err(self.fail(e)));
                return;
            }
        };

        self.transition(SessionState::Streaming);
        let outcome = tokio::select! {
            res = self.exchange(conn.as_mut(), &request) => res,
            reason = &mut cancel => Err(cancelled(reason)),
        };
        let result = match outcome {
            Ok(()) => Ok(self.complete()),
            Err(e) => Err(self.fail(e)),
        };
        // The caller may have stopped waiting
        let _ = done.send(result);

        // Result first: the close runs off the caller's clock
        if tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
            warn!(target: "stream_session", session = self.id, "Close timed out; dropping connection");
        }
    }

    /// Send the request and consume chunks until the final one.
    async fn exchange(&mut self, conn: &mut dyn Connection, request: &ChatRequest) -> Result<()> {
        let body = serde_json::to_string(request)?;
        conn.send_text(body).await?;
        debug!(target: "stream_session", session = self.id, "Request sent");

        while let Some(frame) = conn.recv_text().await {
            let chunk = Chunk::decode(&frame?)?;
            if chunk.is_error() {
                return Err(RouletteError::Upstream {
                    code: chunk.status_code,
                    message: chunk.message,
                    sid: chunk.sid,
                });
            }
            self.buffer.append(&chunk.content);
            if chunk.is_final {
                if let Some(usage) = chunk.usage {
                    debug!(
                        target: "stream_session",
                        session = self.id,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        total_tokens = usage.total_tokens,
                        "Token usage"
                    );
                }
                return Ok(());
            }
        }
        Err(RouletteError::Transport(
            "connection closed before the final chunk".into(),
        ))
    }

    fn complete(&mut self) -> String {
        let text = self.buffer.freeze().to_string();
        self.transition(SessionState::Completed);
        info!(target: "stream_session", session = self.id, chars = text.chars().count(), "Session completed");
        text
    }

    fn fail(&mut self, err: RouletteError) -> RouletteError {
        self.buffer.freeze();
        self.transition(SessionState::Failed);
        warn!(target: "stream_session", session = self.id, code = err.code(), error = %err, partial_len = self.buffer.len(), "Session failed");
        err
    }

    fn transition(&self, next: SessionState) {
        debug!(target: "stream_session", session = self.id, state = ?next, "State transition");
        // No receivers left is fine: nobody is watching.
        let _ = self.state.send(next);
    }
}

fn cancelled(reason: std::result::Result<Duration, oneshot::error::RecvError>) -> RouletteError {
    match reason {
        Ok(limit) => RouletteError::Timeout(limit),
        Err(_) => RouletteError::Transport("session abandoned by caller".into()),
    }
}

/// Caller-side handle to a running session
pub struct SessionHandle {
    id: u64,
    state: watch::Receiver<SessionState>,
    result: oneshot::Receiver<Result<String>>,
    cancel: Option<oneshot::Sender<Duration>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions independently of `wait`
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the terminal event, at most `limit`.
    ///
    /// On timeout the session is told to fail and close its connection; the
    /// close happens on the session task after this returns. A session that
    /// already reported its result closes the same way, off the caller's clock.
    pub async fn wait(mut self, limit: Duration) -> Result<String> {
        match tokio::time::timeout(limit, &mut self.result).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RouletteError::Transport(
                "session ended without a result".into(),
            )),
            Err(_) => {
                warn!(target: "stream_session", session = self.id, ?limit, "No final chunk in time");
                if let Some(cancel) = self.cancel.take() {
                    let _ = cancel.send(limit);
                }
                Err(RouletteError::Timeout(limit))
            }
        }
    }
}

// Dropping the handle drops `cancel`, which the session task treats as
// abandonment: it fails and closes its connection on its own.
