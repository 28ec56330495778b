use std::sync::Arc;

use futures_util::StreamExt;
use plaza_core::{PlazaError, PlazaResult};
use plaza_sse::FrameDecoder;
use plaza_transport::ApiClient;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::{decode_chat_frame, ChatEvent};

/// Client for the AI chat streaming endpoints.
///
/// Streams are opened over the shared [`ApiClient`] so the bearer token
/// and cookie jar are attached, but they bypass the 401 retry path: a
/// rejected open fails fast and the caller decides what to do.
pub struct ChatClient {
    api: Arc<ApiClient>,
}

impl ChatClient {
    /// Wraps the shared transport.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Streams a structured community answer for `payload`.
    pub async fn stream_answer(&self, payload: &Value) -> PlazaResult<ChatStream> {
        self.open("/ai/chat/answer/stream", payload).await
    }

    /// Streams a free-form model completion for `payload`.
    pub async fn stream_completion(&self, payload: &Value) -> PlazaResult<ChatStream> {
        self.open("/ai/chat/llm/stream", payload).await
    }

    /// Fetches the weekly AI activity analysis.
    pub async fn weekly_analysis(
        &self,
        week: Option<&str>,
        limit: Option<u32>,
        top_k: Option<u32>,
    ) -> PlazaResult<Value> {
        let mut query = Vec::new();
        if let Some(week) = week {
            query.push(("week", week.to_owned()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(top_k) = top_k {
            query.push(("topK", top_k.to_string()));
        }
        self.api.get_json("/ai/analysis/weekly", &query).await
    }

    async fn open(&self, path: &str, payload: &Value) -> PlazaResult<ChatStream> {
        let response = self
            .api
            .open_event_stream(Method::POST, path, Some(payload))
            .await?;
        let (tx, rx) = mpsc::channel::<ChatEvent>(256);
        let task = tokio::spawn(pump(response, tx));
        Ok(ChatStream { events: rx, task })
    }
}

/// Consumer handle over a live chat stream.
///
/// Dropping the handle aborts the pump task and releases the HTTP
/// connection, so an abandoned stream never lingers.
#[derive(Debug)]
pub struct ChatStream {
    events: mpsc::Receiver<ChatEvent>,
    task: JoinHandle<PlazaResult<()>>,
}

impl ChatStream {
    /// Next decoded event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Aborts the stream. Intentional termination: no error event is
    /// emitted and [`ChatStream::finish`] resolves `Ok`.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Waits for the pump task and reports how the stream ended.
    /// Call after [`ChatStream::next_event`] has returned `None` (or
    /// after [`ChatStream::cancel`]); a mid-stream read failure
    /// surfaces here as [`PlazaError::StreamDropped`].
    pub async fn finish(mut self) -> PlazaResult<()> {
        self.events.close();
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(PlazaError::StreamDropped(format!(
                "chat stream task failed: {err}"
            ))),
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reads the response body, feeding a dedicated decoder and forwarding
/// decoded events. A read failure emits one final `Error` event and
/// resolves the task with `StreamDropped`; a closed receiver stops the
/// pump silently.
async fn pump(response: reqwest::Response, tx: mpsc::Sender<ChatEvent>) -> PlazaResult<()> {
    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let message = format!("chat stream read failed: {err}");
                let _ = tx
                    .send(ChatEvent::Error {
                        code: None,
                        message: message.clone(),
                    })
                    .await;
                return Err(PlazaError::StreamDropped(message));
            }
        };
        for frame in decoder.feed(&chunk) {
            for event in decode_chat_frame(&frame.data) {
                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}
