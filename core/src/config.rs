use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::spark::ConnectionTarget;
use crate::{Result, RouletteError};

pub const DEFAULT_SPARK_URL: &str = "wss://spark-api.xf-yun.com/v4.0/chat";

const DEFAULT_SYSTEM_PROMPT: &str = "你是一个提取关键词的助手。请从用户的输入中提取出所有的选项（名词或短语）。\
请只输出选项内容，每个选项之间用换行符（\\n）分隔。不要输出任何其他解释性文字。";

/// High-level configuration for the extraction bridge
#[derive(Clone, Debug, Default)]
pub struct RouletteConfig {
    pub provider: ProviderConfig,
    pub chat: ChatParameters,
}

/// Spark account credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .finish()
    }
}

fn redact(s: &str) -> &'static str {
    if s.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// Where and how to reach the chat service
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub url: String,
    pub credentials: Credentials,
    pub request_timeout_ms: u64,
    pub system_prompt: String,
    /// Optional end-user id forwarded in the request header
    pub uid: Option<String>,
}

/// Sampling parameters sent with every chat request
#[derive(Clone, Debug, PartialEq)]
pub struct ChatParameters {
    pub domain: String,
    pub max_tokens: u32,
    pub top_k: u32,
    pub temperature: f32,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            app_id: env_string("SPARK_APP_ID").unwrap_or_default(),
            api_key: env_string("SPARK_API_KEY").unwrap_or_default(),
            api_secret: env_string("SPARK_API_SECRET").unwrap_or_default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: env_string("SPARK_URL").unwrap_or_else(|| DEFAULT_SPARK_URL.to_string()),
            credentials: Credentials::default(),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS").unwrap_or(30_000),
            system_prompt: env_string("ROULETTE_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            uid: env_string("SPARK_UID"),
        }
    }
}

impl Default for ChatParameters {
    fn default() -> Self {
        Self {
            domain: env_string("SPARK_DOMAIN").unwrap_or_else(|| "4.0Ultra".to_string()),
            max_tokens: env_parse("SPARK_MAX_TOKENS").unwrap_or(4096),
            top_k: env_parse("SPARK_TOP_K").unwrap_or(6),
            // low temperature keeps extraction focused
            temperature: env_parse("SPARK_TEMPERATURE").unwrap_or(0.5),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RouletteConfig {
    /// Load configuration from a TOML file (path via ROULETTE_CONFIG or ./roulette.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("ROULETTE_CONFIG").unwrap_or_else(|_| "roulette.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(p: &Path) -> Self {
        let default = Self::default();
        if !p.exists() {
            tracing::info!(target: "config", path = %p.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<RouletteToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "config", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    /// Reject configurations the service would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        let creds = &self.provider.credentials;
        for (name, value) in [
            ("app_id", &creds.app_id),
            ("api_key", &creds.api_key),
            ("api_secret", &creds.api_secret),
        ] {
            if value.trim().is_empty() {
                return Err(RouletteError::Config(format!("missing credential: {name}")));
            }
        }
        ConnectionTarget::parse(&self.provider.url)?;

        let chat = &self.chat;
        if !(chat.temperature > 0.0 && chat.temperature <= 1.0) {
            return Err(RouletteError::Config(format!(
                "temperature must be in (0, 1], got {}",
                chat.temperature
            )));
        }
        if !(1..=6).contains(&chat.top_k) {
            return Err(RouletteError::Config(format!(
                "top_k must be in 1..=6, got {}",
                chat.top_k
            )));
        }
        if chat.max_tokens == 0 {
            return Err(RouletteError::Config("max_tokens must be positive".into()));
        }
        if self.provider.request_timeout_ms == 0 {
            return Err(RouletteError::Config(
                "request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RouletteToml {
    pub provider: Option<ProviderToml>,
    pub chat: Option<ChatToml>,
}

impl RouletteToml {
    fn overlay(self, mut base: RouletteConfig) -> RouletteConfig {
        if let Some(p) = self.provider {
            p.apply(&mut base.provider);
        }
        if let Some(c) = self.chat {
            c.apply(&mut base.chat);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ProviderToml {
    pub url: Option<String>,
    pub app_id: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub system_prompt: Option<String>,
    pub uid: Option<String>,
}
impl ProviderToml {
    fn apply(self, p: &mut ProviderConfig) {
        if let Some(x) = self.url {
            p.url = x;
        }
        if let Some(x) = self.app_id {
            p.credentials.app_id = x;
        }
        if let Some(x) = self.api_key {
            p.credentials.api_key = x;
        }
        if let Some(x) = self.api_secret {
            p.credentials.api_secret = x;
        }
        if let Some(x) = self.request_timeout_ms {
            p.request_timeout_ms = x;
        }
        if let Some(x) = self.system_prompt {
            p.system_prompt = x;
        }
        if let Some(x) = self.uid.filter(|s| !s.is_empty()) {
            p.uid = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ChatToml {
    pub domain: Option<String>,
    pub max_tokens: Option<u32>,
    pub top_k: Option<u32>,
    pub temperature: Option<f32>,
}
impl ChatToml {
    fn apply(self, c: &mut ChatParameters) {
        if let Some(x) = self.domain {
            c.domain = x;
        }
        if let Some(x) = self.max_tokens {
            c.max_tokens = x;
        }
        if let Some(x) = self.top_k {
            c.top_k = x;
        }
        if let Some(x) = self.temperature {
            c.temperature = x;
        }
    }
}
