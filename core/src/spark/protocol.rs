//! Wire format of the Spark chat WebSocket API.
//!
//! One JSON request goes out after the socket opens; the service answers
//! with a sequence of JSON frames, each carrying a slice of the answer.
//! `payload.choices.status == 2` marks the last frame.

use serde::{Deserialize, Serialize};

use crate::config::ChatParameters;
use crate::{Result, RouletteError};

/// `choices.status` value of the final frame
pub const STATUS_FINAL: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub header: RequestHeader,
    pub parameter: RequestParameter,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestHeader {
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestParameter {
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    pub domain: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestPayload {
    pub message: MessageText,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageText {
    pub text: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

impl ChatRequest {
    /// Single-turn extraction request: one system instruction, one user message.
    pub fn extraction(
        app_id: &str,
        uid: Option<&str>,
        params: &ChatParameters,
        system_prompt: &str,
        user_text: &str,
    ) -> Self {
        Self {
            header: RequestHeader {
                app_id: app_id.to_string(),
                uid: uid.map(str::to_string),
            },
            parameter: RequestParameter {
                chat: ChatSettings {
                    domain: params.domain.clone(),
                    temperature: params.temperature,
                    max_tokens: params.max_tokens,
                    top_k: params.top_k,
                },
            },
            payload: RequestPayload {
                message: MessageText {
                    text: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_text)],
                },
            },
        }
    }

    /// Content of the user turn, if any
    pub fn user_text(&self) -> Option<&str> {
        self.payload
            .message
            .text
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}

// =========================
// Inbound frames
// =========================

#[derive(Debug, Clone, Deserialize)]
struct ResponseFrame {
    header: ResponseHeader,
    #[serde(default)]
    payload: Option<ResponsePayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseHeader {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePayload {
    choices: Choices,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choices {
    status: u8,
    #[serde(default)]
    text: Vec<ChoiceText>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceText {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    #[serde(default)]
    text: TokenUsage,
}

/// Token accounting reported with the final frame
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One decoded frame of the streamed answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub status_code: i64,
    pub is_final: bool,
    /// Upstream error text when `status_code != 0`
    pub message: String,
    pub sid: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl Chunk {
    pub fn is_error(&self) -> bool {
        self.status_code != 0
    }

    pub fn decode(frame: &str) -> Result<Self> {
        let frame: ResponseFrame = serde_json::from_str(frame)
            .map_err(|e| RouletteError::Protocol(format!("undecodable frame: {e}")))?;
        let ResponseHeader { code, message, sid } = frame.header;
        if code != 0 {
            return Ok(Self {
                content: String::new(),
                status_code: code,
                is_final: false,
                message,
                sid,
                usage: None,
            });
        }
        let payload = frame
            .payload
            .ok_or_else(|| RouletteError::Protocol("frame with code 0 has no payload".into()))?;
        // The answer text lives in text[0]
        let content = payload
            .choices
            .text
            .into_iter()
            .next()
            .map(|t| t.content)
            .unwrap_or_default();
        Ok(Self {
            content,
            status_code: 0,
            is_final: payload.choices.status == STATUS_FINAL,
            message,
            sid,
            usage: payload.usage.map(|u| u.text),
        })
    }
}
