use tracing::warn;

/// Longest line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence; only
/// complete lines are decoded. A line longer than [`MAX_LINE_BYTES`] is
/// dropped along with the event it belonged to.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    discarding: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut rest = chunk;

        // Only the new chunk is searched; the buffer never holds a newline
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buffer.len() + line.len() > MAX_LINE_BYTES {
                self.drop_oversized_line();
                self.discarding = false;
                continue;
            }

            let mut raw = std::mem::take(&mut self.buffer);
            raw.extend_from_slice(line);
            let text = String::from_utf8_lossy(&raw);
            let text = text.strip_suffix('\r').unwrap_or(&text);
            if let Some(event) = self.process_line(text) {
                events.push(event);
            }
            raw.clear();
            self.buffer = raw;
        }

        if !self.discarding {
            if self.buffer.len() + rest.len() > MAX_LINE_BYTES {
                self.drop_oversized_line();
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }
        events
    }

    fn drop_oversized_line(&mut self) {
        warn!(limit = MAX_LINE_BYTES, "Dropping oversized event-stream line");
        self.buffer.clear();
        self.discarding = true;
        self.event = None;
        self.data.clear();
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(StreamEvent {
            event: self.event.take().unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
