//! In-memory transport that replays a script instead of talking to the network.
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! dependent crates.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use crate::spark::{ChatRequest, Connection, Transport};
use crate::{Result, RouletteError};

/// One scripted event on the receive side of a connection
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver a text frame
    Frame(String),
    /// Pause before the next step
    Delay(Duration),
    /// Fail the receive with a transport error
    Fail(String),
    /// Never deliver anything again
    Hang,
}

type ScriptFn = dyn Fn(&ChatRequest) -> Vec<ScriptStep> + Send + Sync;

/// Transport whose connections answer each request from a script.
///
/// When the script runs out the peer is treated as having closed the socket.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<ScriptFn>,
    connect_error: Option<String>,
    urls: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    close_delay: Option<Duration>,
    closes: Arc<watch::Sender<usize>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self::from_fn(move |_| steps.clone())
    }

    pub fn from_fn(f: impl Fn(&ChatRequest) -> Vec<ScriptStep> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(f),
            connect_error: None,
            urls: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            close_delay: None,
            closes: Arc::new(watch::channel(0).0),
        }
    }

    /// Answers with every whitespace-separated word of the user text on its
    /// own line, one frame per word, with a short pause between frames.
    pub fn echo() -> Self {
        Self::from_fn(|req| {
            let mut steps = Vec::new();
            for word in req.user_text().unwrap_or_default().split_whitespace() {
                steps.push(ScriptStep::Frame(text_frame(&format!("{word}\n"))));
                steps.push(ScriptStep::Delay(Duration::from_millis(2)));
            }
            steps.push(ScriptStep::Frame(final_frame("")));
            steps
        })
    }

    /// Every connection attempt fails
    pub fn refusing(message: impl Into<String>) -> Self {
        let mut t = Self::new(Vec::new());
        t.connect_error = Some(message.into());
        t
    }

    /// Every close takes `delay` before it completes
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    pub fn connected_urls(&self) -> Vec<String> {
        self.urls.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn connections(&self) -> usize {
        self.connected_urls().len()
    }

    /// Number of connections closed by the session
    pub fn closes(&self) -> usize {
        *self.closes.borrow()
    }

    /// Resolve once at least `n` connections have been closed.
    ///
    /// Sessions close after reporting their result, so tests that check the
    /// close count right after `wait` go through here.
    pub async fn closed(&self, n: usize) -> usize {
        let mut rx = self.closes.subscribe();
        let count = rx.wait_for(|c| *c >= n).await.map(|c| *c);
        count.unwrap_or_else(|_| self.closes())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        if let Some(msg) = &self.connect_error {
            return Err(RouletteError::Transport(msg.clone()));
        }
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
            requests: Arc::clone(&self.requests),
            close_delay: self.close_delay,
            closes: Arc::clone(&self.closes),
            pending: VecDeque::new(),
            closed: false,
        }))
    }
}

struct ScriptedConnection {
    script: Arc<ScriptFn>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    close_delay: Option<Duration>,
    closes: Arc<watch::Sender<usize>>,
    pending: VecDeque<ScriptStep>,
    closed: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let req: ChatRequest = serde_json::from_str(&text)?;
        self.pending = (self.script)(&req).into();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req);
        }
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.pending.pop_front()? {
                ScriptStep::Frame(frame) => return Some(Ok(frame)),
                ScriptStep::Delay(d) => tokio::time::sleep(d).await,
                ScriptStep::Fail(msg) => return Some(Err(RouletteError::Transport(msg))),
                ScriptStep::Hang => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.closes.send_modify(|c| *c += 1);
    }
}

/// Successful, non-final frame
pub fn text_frame(content: &str) -> String {
    json!({
        "header": {"code": 0, "message": "Success", "sid": "cht000test", "status": 1},
        "payload": {"choices": {"status": 1, "seq": 0, "text": [{"content": content, "role": "assistant", "index": 0}]}}
    })
    .to_string()
}

/// Successful final frame
pub fn final_frame(content: &str) -> String {
    json!({
        "header": {"code": 0, "message": "Success", "sid": "cht000test", "status": 2},
        "payload": {
            "choices": {"status": 2, "seq": 1, "text": [{"content": content, "role": "assistant", "index": 0}]},
            "usage": {"text": {"question_tokens": 1, "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}}
        }
    })
    .to_string()
}

/// Upstream error frame
pub fn error_frame(code: i64, message: &str) -> String {
    json!({"header": {"code": code, "message": message, "sid": "cht000test", "status": 2}}).to_string()
}
