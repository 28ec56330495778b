//! Live notification feed with reconnect and reconciliation.
//!
//! A [`NotificationCenter`] owns one long-lived SSE connection to the
//! backend and merges streamed deltas into a locally held list, which a
//! periodic resync against the REST endpoints keeps authoritative. The
//! connection is driven by an explicit link state machine
//! (`Idle | Connecting | Streaming | Backoff`) with an epoch counter, so
//! racing connects and scheduled reconnects can never produce two live
//! connections.
//!
//! # Main types
//!
//! - [`NotificationCenter`]: Feed state, stream link, and merge logic.
//! - [`NotificationItem`]: One reconciled notification.
//! - [`NotifyEvent`]: Broadcast feed of deltas, resyncs, and drops.
//! - [`NotificationApi`]: Thin typed REST wrappers.

/// REST collaborators.
pub mod api;
/// Feed orchestration and the stream link state machine.
pub mod center;
/// Notification data model and merge rules.
pub mod item;

pub use api::NotificationApi;
pub use center::{LinkState, NotificationCenter, NotifyEvent, StreamPolicy};
pub use item::{NotificationDelta, NotificationItem};
