//! Incremental Server-Sent Events parser for session subscriptions.
//!
//! The server emits one `data:` line per mailbox value:
//!
//! ```text
//! event: control
//! data: {"action":"start","timestamp":1700000000000}
//!
//! ```
//!
//! Bytes are buffered until a full line is available so multi-byte
//! characters split across network chunks decode correctly.

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if present.
    pub event_type: Option<String>,
    /// `data:` field(s), joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        event
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.has_data() {
                return Some(self.build());
            }
            // Keep-alive or a dispatch with no data: drop any stray event name.
            self.event_type = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = parse_field(line);
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event_type = Some(value.to_owned()),
            _ => {}
        }
        None
    }
}

/// Split `field: value`, stripping one leading space from the value.
/// A line without a colon is a field with an empty value.
fn parse_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

/// Feeds raw bytes in, yields complete events out.
#[derive(Debug, Default)]
pub struct SseLineParser {
    pending: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Emit whatever is left once the stream ends.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.builder.process_line(line);
        }
        self.builder.has_data().then(|| self.builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_variants() {
        assert_eq!(parse_field("data: hello"), ("data", "hello"));
        assert_eq!(parse_field("data:hello"), ("data", "hello"));
        assert_eq!(parse_field("data:"), ("data", ""));
        assert_eq!(parse_field(r#"data: {"k":"v"}"#), ("data", r#"{"k":"v"}"#));
        assert_eq!(parse_field("data"), ("data", ""));
    }

    #[test]
    fn single_event_with_type() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"event: control\ndata: {\"a\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event_type: Some("control".into()),
                data: "{\"a\":1}".into(),
            }]
        );
    }

    #[test]
    fn event_split_across_chunks() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"da").is_empty());
        assert!(parser.push(b"ta: hel").is_empty());
        assert!(parser.push(b"lo\n").is_empty());
        let events = parser.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let text = "data: ⚡ ok\n\n".as_bytes();
        // '⚡' is three bytes starting at offset 6.
        let mut parser = SseLineParser::new();
        assert!(parser.push(&text[..7]).is_empty());
        let events = parser.push(&text[7..]);
        assert_eq!(events[0].data, "⚡ ok");
    }

    #[test]
    fn comments_and_keepalives_are_ignored() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b": keep-alive\n\n:\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn crlf_and_multiline_data() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b"data: a\r\ndata: b\r\n\r\n");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn flush_emits_trailing_event() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: tail").is_empty());
        assert_eq!(parser.flush().map(|e| e.data), Some("tail".to_owned()));
        assert!(parser.flush().is_none());
    }
}
