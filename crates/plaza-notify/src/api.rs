use std::sync::Arc;

use plaza_core::PlazaResult;
use plaza_transport::ApiClient;
use reqwest::Method;
use serde::Deserialize;

use crate::item::NotificationDelta;

/// Thin typed wrappers over the notification REST endpoints.
pub struct NotificationApi {
    api: Arc<ApiClient>,
}

/// The list endpoint answers either a bare array or a wrapped page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListReply {
    Bare(Vec<NotificationDelta>),
    Wrapped { items: Vec<NotificationDelta> },
}

/// The unread-count endpoint answers a bare number or a keyed object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountReply {
    Bare(u64),
    Keyed {
        #[serde(alias = "unreadCount")]
        count: u64,
    },
}

impl NotificationApi {
    /// Wraps the shared transport.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// One page of the authoritative notification list.
    pub async fn fetch_notifications(
        &self,
        page: u32,
        size: u32,
    ) -> PlazaResult<Vec<NotificationDelta>> {
        let reply: ListReply = self
            .api
            .get_json(
                "/notifications",
                &[("page", page.to_string()), ("size", size.to_string())],
            )
            .await?;
        Ok(match reply {
            ListReply::Bare(rows) | ListReply::Wrapped { items: rows } => rows,
        })
    }

    /// Server-side unread total.
    pub async fn fetch_unread_count(&self) -> PlazaResult<u64> {
        let reply: CountReply = self.api.get_json("/notifications/unread-count", &[]).await?;
        Ok(match reply {
            CountReply::Bare(count) | CountReply::Keyed { count } => count,
        })
    }

    /// Marks one notification read on the server.
    pub async fn mark_notification_read(&self, id: i64) -> PlazaResult<()> {
        self.api
            .post_ok(&format!("/notifications/{id}/read"), None)
            .await
    }

    /// Deletes every already-read notification on the server.
    pub async fn delete_read_notifications(&self) -> PlazaResult<()> {
        self.api.delete_ok("/notifications/read").await
    }

    /// Opens the long-lived notification stream.
    pub async fn open_stream(&self) -> PlazaResult<reqwest::Response> {
        self.api
            .open_event_stream(Method::GET, "/notifications/stream", None)
            .await
    }
}
