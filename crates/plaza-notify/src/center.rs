use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use plaza_core::{PlazaError, PlazaResult};
use plaza_sse::{Frame, FrameDecoder};
use plaza_transport::{ApiClient, SessionObserver};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::NotificationApi;
use crate::item::{NotificationDelta, NotificationItem};

// Paging is 1-based on the backend; a resync pulls a wider window than
// interactive listing.
const RESYNC_PAGE: u32 = 1;
const RESYNC_PAGE_SIZE: u32 = 50;
const EVENT_CAPACITY: usize = 64;

/// Reconnect policy for the notification link.
#[derive(Debug, Clone)]
pub struct StreamPolicy {
    /// Fixed delay between a drop and the reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Connection state of the notification link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection and none pending.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Frames are being read.
    Streaming,
    /// The link dropped; a reconnect timer is pending.
    Backoff,
}

/// Feed updates broadcast to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyEvent {
    /// A streamed delta was merged; the payload is the reconciled item.
    Delta(NotificationItem),
    /// The authoritative list was refetched.
    Resynced {
        /// Items now held locally.
        total: usize,
        /// Unread items among them.
        unread: usize,
    },
    /// The stream dropped; a reconnect is scheduled.
    Dropped(String),
}

#[derive(Debug, Default)]
struct FeedState {
    items: Vec<NotificationItem>,
    unread_count: usize,
    is_syncing: bool,
    last_synced_at: Option<DateTime<Utc>>,
}

impl FeedState {
    fn recount_unread(&mut self) {
        self.unread_count = self.items.iter().filter(|item| !item.is_read).count();
    }
}

#[derive(Debug)]
struct Link {
    state: LinkState,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            state: LinkState::Idle,
            epoch: 0,
            task: None,
        }
    }
}

struct CenterInner {
    api: NotificationApi,
    state: Mutex<FeedState>,
    link: Mutex<Link>,
    events: broadcast::Sender<NotifyEvent>,
    policy: StreamPolicy,
}

/// Owner of the live notification feed.
///
/// Holds the reconciled item list, drives the SSE link state machine,
/// and broadcasts [`NotifyEvent`]s. Cheap to clone; clones share the
/// same feed and link, which is how the background link task keeps the
/// center alive while the caller holds its own handle.
///
/// The epoch counter on the link guards every state transition:
/// `connect()` and `disconnect()` bump it, so a reconnect timer that
/// lost the race observes a stale epoch and stands down instead of
/// opening a duplicate connection.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

impl NotificationCenter {
    /// Center with the default 1-second reconnect delay.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self::with_policy(api, StreamPolicy::default())
    }

    /// Center with an explicit reconnect policy.
    pub fn with_policy(api: Arc<ApiClient>, policy: StreamPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(CenterInner {
                api: NotificationApi::new(api),
                state: Mutex::new(FeedState::default()),
                link: Mutex::new(Link::default()),
                events,
                policy,
            }),
        }
    }

    /// Subscribes to feed updates.
    pub fn subscribe(&self) -> broadcast::Receiver<NotifyEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the reconciled items, newest first.
    pub async fn items(&self) -> Vec<NotificationItem> {
        self.inner.state.lock().await.items.clone()
    }

    /// Locally counted unread notifications.
    pub async fn unread_count(&self) -> usize {
        self.inner.state.lock().await.unread_count
    }

    /// When the list was last rebuilt from the REST endpoint.
    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().await.last_synced_at
    }

    /// Current link state.
    pub async fn link_state(&self) -> LinkState {
        self.inner.link.lock().await.state
    }

    /// Opens the stream link. A no-op while a link is already
    /// connecting or streaming; during backoff it cancels the pending
    /// timer and connects immediately.
    pub async fn connect(&self) {
        let mut link = self.inner.link.lock().await;
        if matches!(link.state, LinkState::Connecting | LinkState::Streaming) {
            debug!("notification stream already connected");
            return;
        }
        if let Some(task) = link.task.take() {
            task.abort();
        }
        link.epoch += 1;
        link.state = LinkState::Connecting;
        let epoch = link.epoch;
        let center = self.clone();
        link.task = Some(tokio::spawn(async move { center.run_link(epoch).await }));
    }

    /// Closes the link and cancels any pending reconnect.
    pub async fn disconnect(&self) {
        let mut link = self.inner.link.lock().await;
        link.epoch += 1;
        link.state = LinkState::Idle;
        if let Some(task) = link.task.take() {
            task.abort();
        }
        debug!("notification stream disconnected");
    }

    /// Rebuilds the item list from the REST endpoint.
    ///
    /// Guarded: while one sync is in flight, further calls return
    /// immediately. The guard clears on success and failure alike.
    pub async fn sync_list(&self, page: u32, size: u32) -> PlazaResult<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.is_syncing {
                debug!("list sync already in flight");
                return Ok(());
            }
            state.is_syncing = true;
        }

        let outcome = self.inner.api.fetch_notifications(page, size).await;

        let mut state = self.inner.state.lock().await;
        state.is_syncing = false;
        let rows = outcome?;
        state.items = rows
            .into_iter()
            .filter_map(|row| row.identity().map(|id| row.into_item(id)))
            .collect();
        state.recount_unread();
        state.last_synced_at = Some(Utc::now());
        let total = state.items.len();
        let unread = state.unread_count;
        drop(state);

        info!(total, unread, "notification list resynced");
        let _ = self.inner.events.send(NotifyEvent::Resynced { total, unread });
        Ok(())
    }

    /// Optimistically marks a notification read, then confirms with the
    /// backend; a rejected call rolls the local change back and returns
    /// the error. Unknown or already-read ids are no-ops.
    pub async fn mark_read(&self, id: i64) -> PlazaResult<()> {
        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let Some(item) = state
                .items
                .iter_mut()
                .find(|item| item.notification_id == id)
            else {
                return Ok(());
            };
            if item.is_read {
                return Ok(());
            }
            item.is_read = true;
            state.unread_count = state.unread_count.saturating_sub(1);
        }

        if let Err(err) = self.inner.api.mark_notification_read(id).await {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            if let Some(item) = state
                .items
                .iter_mut()
                .find(|item| item.notification_id == id)
            {
                item.is_read = false;
            }
            state.unread_count += 1;
            warn!(id, error = %err, "mark-read rejected, rolled back");
            return Err(err);
        }
        Ok(())
    }

    /// Deletes read notifications on the server, then locally.
    pub async fn delete_read(&self) -> PlazaResult<()> {
        self.inner.api.delete_read_notifications().await?;
        let mut state = self.inner.state.lock().await;
        state.items.retain(|item| !item.is_read);
        state.recount_unread();
        Ok(())
    }

    /// Forgets all local feed state. Used on session teardown.
    pub async fn clear_local(&self) {
        let mut state = self.inner.state.lock().await;
        state.items.clear();
        state.unread_count = 0;
        state.is_syncing = false;
        state.last_synced_at = None;
    }

    // Boxed (not `async fn`) to break the run_link -> handle_drop ->
    // spawn(run_link) cycle that stops the compiler from proving the
    // spawned future `Send`.
    fn run_link(&self, epoch: u64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(err) = self.stream_once(epoch).await {
                self.handle_drop(epoch, &err).await;
            }
        })
    }

    /// One connection attempt and read loop. `Ok` means the link was
    /// superseded while opening; reaching end-of-stream is an error,
    /// because only `disconnect()` ends this stream on purpose.
    async fn stream_once(&self, epoch: u64) -> PlazaResult<()> {
        let response = self.inner.api.open_stream().await?;
        {
            let mut link = self.inner.link.lock().await;
            if link.epoch != epoch {
                return Ok(());
            }
            link.state = LinkState::Streaming;
        }
        info!("notification stream connected");

        let mut decoder = FrameDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                PlazaError::StreamDropped(format!("notification stream read failed: {err}"))
            })?;
            for frame in decoder.feed(&chunk) {
                self.apply_frame(&frame).await;
            }
        }
        Err(PlazaError::StreamDropped(
            "notification stream closed by server".to_owned(),
        ))
    }

    /// Merges one frame into the feed.
    async fn apply_frame(&self, frame: &Frame) {
        if frame.event != "notification" && !frame.is_default_event() {
            return;
        }
        let delta: NotificationDelta = match serde_json::from_str(&frame.data) {
            Ok(delta) => delta,
            Err(err) => {
                debug!(error = %err, "skipping unparseable notification frame");
                return;
            }
        };
        let Some(id) = delta.identity() else {
            // No identity to merge on: the payload is ambiguous, so
            // refetch the authoritative list instead of guessing.
            warn!("notification frame without identity, resyncing");
            self.spawn_resync();
            return;
        };

        let item = {
            let mut state = self.inner.state.lock().await;
            let item = match state
                .items
                .iter_mut()
                .find(|item| item.notification_id == id)
            {
                Some(existing) => {
                    delta.apply_to(existing);
                    existing.clone()
                }
                None => {
                    let item = delta.into_item(id);
                    state.items.insert(0, item.clone());
                    item
                }
            };
            state.recount_unread();
            item
        };
        let _ = self.inner.events.send(NotifyEvent::Delta(item));
    }

    fn spawn_resync(&self) {
        let center = self.clone();
        tokio::spawn(async move {
            if let Err(err) = center.sync_list(RESYNC_PAGE, RESYNC_PAGE_SIZE).await {
                warn!(error = %err, "notification resync failed");
            }
        });
    }

    /// Drop handling: emit one `Dropped`, enter backoff, and reconnect
    /// after the fixed delay unless a newer connect or disconnect has
    /// claimed the link meanwhile.
    async fn handle_drop(&self, epoch: u64, err: &PlazaError) {
        {
            let mut link = self.inner.link.lock().await;
            if link.epoch != epoch {
                return;
            }
            link.state = LinkState::Backoff;
        }
        warn!(error = %err, "notification stream dropped, reconnecting after delay");
        let _ = self.inner.events.send(NotifyEvent::Dropped(err.to_string()));

        tokio::time::sleep(self.inner.policy.reconnect_delay).await;

        let mut link = self.inner.link.lock().await;
        if link.epoch != epoch || link.state != LinkState::Backoff {
            return;
        }
        link.epoch += 1;
        link.state = LinkState::Connecting;
        let next_epoch = link.epoch;
        let center = self.clone();
        link.task = Some(tokio::spawn(async move { center.run_link(next_epoch).await }));
    }
}

#[async_trait]
impl SessionObserver for NotificationCenter {
    async fn on_session_expired(&self) {
        self.disconnect().await;
        self.clear_local().await;
    }
}
