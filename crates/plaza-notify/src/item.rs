use serde::{Deserialize, Serialize};

/// One reconciled notification.
///
/// Identity is `notification_id`; `event_id` is a display and
/// deduplication aid only and is synthesized as `n-{id}` when the
/// backend omits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    /// Display/dedup key, never used for merging.
    pub event_id: String,
    /// Unique identity within the feed.
    pub notification_id: i64,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Board post this notification points at, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    /// Comment this notification points at, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<i64>,
    /// Creation timestamp as the backend rendered it.
    pub created_at: String,
    /// Whether the user has seen this notification.
    #[serde(default)]
    pub is_read: bool,
}

/// Partial notification payload as it appears on the wire, both in
/// stream frames and in list rows. Every field is optional; identity
/// may arrive under `notificationId` or the older `id` key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDelta {
    /// Explicit display key, when the backend sent one.
    pub event_id: Option<String>,
    /// Primary identity key.
    pub notification_id: Option<i64>,
    /// Legacy identity key, used when `notification_id` is absent.
    pub id: Option<i64>,
    /// Headline, when changed or newly created.
    pub title: Option<String>,
    /// Body text.
    pub message: Option<String>,
    /// Referenced post.
    pub post_id: Option<i64>,
    /// Referenced comment.
    pub comment_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Read flag.
    pub is_read: Option<bool>,
}

impl NotificationDelta {
    /// The merge identity, preferring `notificationId` over `id`.
    pub fn identity(&self) -> Option<i64> {
        self.notification_id.or(self.id)
    }

    /// Shallow overwrite: fields present in the delta replace the
    /// item's; absent fields keep their current value. `event_id` is
    /// the exception: the existing item's display key survives the
    /// merge, and the delta's only seeds brand-new items.
    pub fn apply_to(&self, item: &mut NotificationItem) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(message) = &self.message {
            item.message = message.clone();
        }
        if let Some(post_id) = self.post_id {
            item.post_id = Some(post_id);
        }
        if let Some(comment_id) = self.comment_id {
            item.comment_id = Some(comment_id);
        }
        if let Some(created_at) = &self.created_at {
            item.created_at = created_at.clone();
        }
        item.is_read = self.is_read.unwrap_or(item.is_read);
    }

    /// Materializes a full item under the given identity, filling the
    /// gaps a partial payload leaves.
    pub fn into_item(self, id: i64) -> NotificationItem {
        NotificationItem {
            event_id: self.event_id.unwrap_or_else(|| format!("n-{id}")),
            notification_id: id,
            title: self.title.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            post_id: self.post_id,
            comment_id: self.comment_id,
            created_at: self.created_at.unwrap_or_default(),
            is_read: self.is_read.unwrap_or(false),
        }
    }
}
