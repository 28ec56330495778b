//! Streaming AI chat client.
//!
//! Opens a POST request whose response body is an SSE stream, decodes it
//! with [`plaza_sse::FrameDecoder`], and maps each frame's JSON payload
//! onto [`ChatEvent`]s delivered through a [`ChatStream`]. Malformed
//! frames are dropped rather than failing the stream; cancellation is
//! silent and distinct from error.
//!
//! # Main types
//!
//! - [`ChatClient`]: Opens answer/completion streams.
//! - [`ChatStream`]: Consumer handle over the decoded event channel.
//! - [`ChatEvent`]: Delta, done, or in-band error.

/// Chat stream client and consumer handle.
pub mod client;
/// Event mapping from decoded frames.
pub mod event;

pub use client::{ChatClient, ChatStream};
pub use event::ChatEvent;
