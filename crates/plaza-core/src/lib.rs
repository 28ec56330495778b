//! Core types and error definitions for the Plaza client SDK.
//!
//! This crate provides the foundational types shared across all Plaza crates:
//! the unified error taxonomy of the transport layer and the credential pair
//! exchanged with the backend's refresh endpoint.
//!
//! # Main types
//!
//! - [`PlazaError`]: Unified error enum for all Plaza subsystems.
//! - [`PlazaResult`]: Convenience alias for `Result<T, PlazaError>`.
//! - [`TokenPair`]: An access/refresh credential pair as issued by the
//!   backend (`/users/refresh` response shape).

use serde::{Deserialize, Serialize};

/// Top-level error type for the Plaza client SDK.
///
/// The variants mirror the failure classes of the transport layer. Malformed
/// frame payloads deliberately have no variant here: the stream clients drop
/// them locally so the streams stay resilient to proxy and keepalive noise,
/// and a caller never observes them.
#[derive(Debug, thiserror::Error)]
pub enum PlazaError {
    /// An outbound request failed to build or send, or a plain REST call
    /// came back with an unexpected status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A streaming endpoint could not be opened: non-2xx status or an
    /// unreadable response body. Fatal to that stream attempt.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session can no longer be authenticated: a 401 arrived with no
    /// stored refresh credential, or the refresh call itself failed. Always
    /// accompanied by session teardown.
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    /// A live stream ended without an explicit close from our side. The
    /// notification client recovers from this automatically via its
    /// reconnect policy; chat surfaces it to the caller.
    #[error("Stream dropped: {0}")]
    StreamDropped(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`PlazaError`].
pub type PlazaResult<T> = Result<T, PlazaError>;

/// An access/refresh credential pair.
///
/// This is both what the SDK persists between runs and the wire shape of the
/// `/users/refresh` response. The backend may rotate only the access token,
/// in which case `refresh_token` is absent; token stores keep the previously
/// stored refresh token in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer credential attached to every request.
    pub access_token: String,
    /// Long-lived credential presented to the refresh endpoint. Optional on
    /// the wire; absence means "keep the old one".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Creates a pair with both credentials.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Creates a pair carrying only a rotated access token.
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn token_pair_camel_case_wire_shape() {
        let pair = TokenPair::new("acc-1", "ref-1");
        let json = serde_json::to_string(&pair).unwrap();
        assert!(json.contains("\"accessToken\":\"acc-1\""));
        assert!(json.contains("\"refreshToken\":\"ref-1\""));
    }

    #[test]
    fn token_pair_refresh_optional_on_the_wire() {
        let parsed: TokenPair = serde_json::from_str(r#"{"accessToken":"acc-2"}"#).unwrap();
        assert_eq!(parsed.access_token, "acc-2");
        assert!(parsed.refresh_token.is_none());

        let json = serde_json::to_string(&TokenPair::access_only("acc-2")).unwrap();
        assert!(!json.contains("refreshToken"));
    }

    #[test]
    fn error_display_prefixes() {
        assert_eq!(
            PlazaError::Transport("HTTP 503".into()).to_string(),
            "Transport error: HTTP 503"
        );
        assert_eq!(
            PlazaError::AuthExpired("no refresh credential stored".into()).to_string(),
            "Authentication expired: no refresh credential stored"
        );
    }
}
