use tracing::trace;

use crate::frame::Frame;

/// Incremental SSE decoder.
///
/// Feed raw body chunks as they arrive; each [`FrameDecoder::feed`] call
/// returns every frame that chunk completed, in order. Bytes after the
/// last complete frame stay buffered, including any partially received
/// multi-byte UTF-8 sequence. Invalid sequences decode to U+FFFD instead
/// of failing the stream.
///
/// One decoder serves one connection; a trailing unterminated frame is
/// dropped when the decoder is dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    buf: String,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one chunk and returns the frames it completed.
    ///
    /// A frame is complete once its terminating blank line (`\n\n` or
    /// `\r\n\r\n`) has arrived. Frames with no `data:` line, or whose
    /// joined payload is blank, are keepalives and are dropped here.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.ingest(chunk);
        let mut frames = Vec::new();
        while let Some((at, len)) = self.next_separator() {
            let segment: String = self.buf.drain(..at + len).collect();
            match parse_frame(&segment[..at]) {
                Some(frame) => frames.push(frame),
                None => trace!("dropped keepalive frame"),
            }
        }
        frames
    }

    /// Appends a chunk to the text buffer. An incomplete trailing UTF-8
    /// sequence is carried over to the next call; invalid sequences are
    /// replaced with U+FFFD.
    fn ingest(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(_) => {
                    self.buf.push_str(&String::from_utf8_lossy(&self.pending));
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.buf
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        // Truncated sequence: may complete next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.buf.push('\u{FFFD}');
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    /// Byte offset and length of the earliest frame separator. The
    /// four-byte `\r\n\r\n` wins over `\n\n` when both start at the same
    /// offset.
    fn next_separator(&self) -> Option<(usize, usize)> {
        match (self.buf.find("\r\n\r\n"), self.buf.find("\n\n")) {
            (Some(crlf), Some(lf)) if crlf <= lf => Some((crlf, 4)),
            (Some(_), Some(lf)) => Some((lf, 2)),
            (Some(crlf), None) => Some((crlf, 4)),
            (None, Some(lf)) => Some((lf, 2)),
            (None, None) => None,
        }
    }
}

fn parse_frame(segment: &str) -> Option<Frame> {
    let mut event: Option<&str> = None;
    let mut data: Vec<&str> = Vec::new();
    for line in segment.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(name) = line.strip_prefix("event:") {
            // First event line wins.
            if event.is_none() {
                event = Some(name.trim());
            }
        } else if let Some(payload) = line.strip_prefix("data:") {
            // At most one leading space belongs to the field syntax.
            data.push(payload.strip_prefix(' ').unwrap_or(payload));
        }
    }
    if data.is_empty() {
        return None;
    }
    let joined = data.join("\n");
    if joined.trim().is_empty() {
        return None;
    }
    Some(Frame {
        event: event.unwrap_or("message").to_owned(),
        data: joined,
    })
}
