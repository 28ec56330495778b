//! Incremental Server-Sent-Events frame decoding.
//!
//! The decoder consumes raw response-body chunks and yields complete
//! [`Frame`]s as soon as their terminating blank line arrives. Chunk
//! boundaries carry no meaning: a frame may span many chunks, a single
//! chunk may hold many frames, and multi-byte UTF-8 sequences may be
//! split anywhere.
//!
//! # Main types
//!
//! - [`Frame`]: One decoded event: name plus joined data payload.
//! - [`FrameDecoder`]: Streaming decoder fed with byte chunks.

/// Streaming decoder state machine.
pub mod decoder;
/// Decoded frame type.
pub mod frame;

pub use decoder::FrameDecoder;
pub use frame::Frame;
