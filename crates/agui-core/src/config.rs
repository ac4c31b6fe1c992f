//! Session configuration, supplied once at construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SessionError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
pub const DEFAULT_SOCKET_PATH: &str = "/agui/ws";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP base address of the backend, e.g. `http://localhost:3001`.
    pub base_url: String,
    /// Path of the streaming channel, appended to the derived `ws(s)://` address.
    pub socket_path: String,
    pub connect_timeout: Duration,
    /// Timeout for each fallback request.
    pub request_timeout: Duration,
    /// Whether `send` may fall back to HTTP when the channel is down.
    pub fallback_enabled: bool,
    /// Upper bound on retained conversations (least recently active evicted).
    pub max_conversations: Option<usize>,
    /// Directory for wire transcripts. `None` disables them.
    pub wire_log_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            fallback_enabled: true,
            max_conversations: None,
            wire_log_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Base address without a trailing slash.
    pub fn http_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Derive the streaming channel address: `http → ws`, `https → wss`,
    /// socket path appended.
    pub fn socket_url(&self) -> Result<String, SessionError> {
        let base = self.http_base();
        let rest = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(SessionError::Connection(format!(
                "base URL must start with http:// or https://: {}",
                self.base_url
            )));
        };

        let path = self.socket_path.trim_start_matches('/');
        Ok(format!("{}/{}", rest, path))
    }

    /// Full URL of a fallback endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.http_base(), path.trim_start_matches('/'))
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn socket_path(mut self, path: impl Into<String>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.fallback_enabled = enabled;
        self
    }

    pub fn max_conversations(mut self, max: usize) -> Self {
        self.config.max_conversations = Some(max);
        self
    }

    pub fn wire_log_dir(mut self, dir: PathBuf) -> Self {
        self.config.wire_log_dir = Some(dir);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
