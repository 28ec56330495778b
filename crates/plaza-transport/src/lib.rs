//! Authenticated HTTP transport with single-flight credential refresh.
//!
//! Every request leaves through an [`ApiClient`], which attaches the
//! stored bearer credential and retries once after a 401 by refreshing
//! through the [`RefreshGate`]. Concurrent 401s collapse into one
//! refresh call; callers that arrive mid-refresh suspend and replay
//! with the new token in arrival order.
//!
//! # Main types
//!
//! - [`ApiClient`]: Request wrapper with retry-once 401 handling.
//! - [`RefreshGate`]: Single-flight coordinator for token refresh.
//! - [`TokenStore`]: Credential persistence trait.
//! - [`SessionObserver`]: Hook invoked when the session is torn down.

/// HTTP client wrapper and session teardown.
pub mod client;
/// Transport configuration.
pub mod config;
/// Single-flight refresh coordination.
pub mod gate;
/// Credential storage.
pub mod token;

pub use client::{ApiClient, SessionObserver};
pub use config::TransportConfig;
pub use gate::RefreshGate;
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
