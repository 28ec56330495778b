use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Message shown when an in-band error carries no usable text.
pub const GENERIC_STREAM_ERROR: &str = "chat stream reported an unspecified error";

/// Events decoded from a chat answer stream.
///
/// A single frame may yield two events: a payload carrying both an
/// `error` and a `done` flag emits the error first and then the done.
/// That ordering is part of the contract with consumers, which may
/// display the error before finalizing the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// An incremental fragment of the streamed answer text.
    Delta {
        /// Text to append to the answer so far.
        text: String,
    },

    /// The answer is complete.
    Done {
        /// The full final payload, including any answer metadata the
        /// backend attached alongside the `done` flag.
        payload: Value,
    },

    /// The backend reported an error inside the stream.
    Error {
        /// Machine-readable code, when the backend supplied one.
        code: Option<String>,
        /// Human-readable description, or [`GENERIC_STREAM_ERROR`].
        message: String,
    },
}

/// Decodes one frame payload into chat events.
///
/// Unparseable JSON yields no events; proxies and keepalive layers are
/// allowed to inject noise without breaking the stream.
pub fn decode_chat_frame(data: &str) -> Vec<ChatEvent> {
    match serde_json::from_str::<Value>(data) {
        Ok(payload) => events_from_payload(&payload),
        Err(err) => {
            debug!(error = %err, "dropping unparseable chat frame");
            Vec::new()
        }
    }
}

/// Maps a parsed payload onto events, mirroring the upstream client's
/// dispatch: `error` first (possibly followed by `done`), else `delta`,
/// else `done`. The branches are mutually exclusive apart from the
/// error-then-done pairing.
pub fn events_from_payload(payload: &Value) -> Vec<ChatEvent> {
    let mut events = Vec::new();

    let error = payload.get("error");
    if is_truthy(error) {
        events.push(ChatEvent::Error {
            code: error.and_then(error_code),
            message: error.map_or_else(|| GENERIC_STREAM_ERROR.to_owned(), error_message),
        });
        if is_truthy(payload.get("done")) {
            events.push(ChatEvent::Done {
                payload: payload.clone(),
            });
        }
        return events;
    }

    let delta = payload.get("delta");
    if is_truthy(delta) {
        // A truthy delta claims the dispatch even when it is not a
        // string we can render.
        if let Some(text) = delta.and_then(Value::as_str) {
            events.push(ChatEvent::Delta {
                text: text.to_owned(),
            });
        }
        return events;
    }

    if is_truthy(payload.get("done")) {
        events.push(ChatEvent::Done {
            payload: payload.clone(),
        });
    }
    events
}

/// JavaScript-style truthiness: absent, `null`, `false`, `0`, and `""`
/// are falsy; every other value, including empty arrays and objects, is
/// truthy.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn error_code(error: &Value) -> Option<String> {
    let code = error.get("code")?;
    if code.is_null() {
        return None;
    }
    Some(match code.as_str() {
        Some(text) => text.to_owned(),
        None => code.to_string(),
    })
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| GENERIC_STREAM_ERROR.to_owned(), str::to_owned)
}
