/// One complete Server-Sent-Events frame.
///
/// `data` is the concatenation of every `data:` line in the frame,
/// joined with `\n`, exactly as the payload should be handed to a JSON
/// parser. Frames without any data line are never constructed; the
/// decoder drops them as keepalives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event name from the first `event:` line, or `"message"` when the
    /// frame carried none.
    pub event: String,
    /// Joined data payload.
    pub data: String,
}

impl Frame {
    /// True when the frame carried no explicit `event:` field.
    pub fn is_default_event(&self) -> bool {
        self.event == "message"
    }
}
