use serde::Deserialize;

/// Settings for the HTTP transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Base URL all endpoint paths are joined onto, e.g.
    /// `https://plaza.example.com/api`.
    pub base_url: String,
    /// Connect timeout applied to every request, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on the credential refresh call, in milliseconds. The
    /// refresh holds the gate while it runs, so it gets an explicit
    /// bound even though ordinary requests run without a total timeout.
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_refresh_timeout_ms() -> u64 {
    10_000
}

impl TransportConfig {
    /// Config with default timeouts for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout_ms: default_connect_timeout_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
        }
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
