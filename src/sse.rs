//! Server-Sent-Events listener worker.
//!
//! One GET with `Accept: text/event-stream`, consumed incrementally. The
//! parser handles the `data:` field, dispatches on the blank-line
//! terminator, and skips comments and other fields. No reconnection: when
//! the stream errors or ends, the link closes and stays closed.

use futures_util::StreamExt;
use tracing::{debug, error};

use crate::link::StreamEvent;

/// Incremental `text/event-stream` parser. Feed it raw chunks as they
/// arrive; complete event payloads come back out.
#[derive(Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl EventStreamParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line terminates the event.
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        events
    }
}

/// Subscribe to `url` and forward each event payload through `emit`.
pub fn spawn(url: String, emit: impl Fn(StreamEvent) + Send + 'static) {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to create event stream runtime");
        rt.block_on(async move {
            let client = reqwest::Client::new();
            let response = match client
                .get(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    error!(%url, %err, "event stream request failed");
                    emit(StreamEvent::Error(err.to_string()));
                    emit(StreamEvent::Closed);
                    return;
                }
            };
            if !response.status().is_success() {
                error!(%url, status = %response.status(), "event stream refused");
                emit(StreamEvent::Error(format!(
                    "unexpected status {}",
                    response.status()
                )));
                emit(StreamEvent::Closed);
                return;
            }

            debug!(%url, "event stream connected");
            emit(StreamEvent::Opened);

            let mut parser = EventStreamParser::default();
            let mut chunks = response.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(bytes) => {
                        for payload in parser.feed(&bytes) {
                            emit(StreamEvent::Message(payload));
                        }
                    }
                    Err(err) => {
                        error!(%err, "event stream read failed");
                        emit(StreamEvent::Error(err.to_string()));
                        break;
                    }
                }
            }

            emit(StreamEvent::Closed);
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_blank_line() {
        let mut parser = EventStreamParser::default();
        assert_eq!(parser.feed(b"data: hello\n"), Vec::<String>::new());
        assert_eq!(parser.feed(b"\n"), vec!["hello".to_string()]);
    }

    #[test]
    fn reassembles_fields_split_across_chunks() {
        let mut parser = EventStreamParser::default();
        assert!(parser.feed(b"data: he").is_empty());
        assert_eq!(parser.feed(b"llo\n\n"), vec!["hello".to_string()]);
    }

    #[test]
    fn joins_multiple_data_fields_with_newlines() {
        let mut parser = EventStreamParser::default();
        assert_eq!(
            parser.feed(b"data: a\ndata: b\n\n"),
            vec!["a\nb".to_string()]
        );
    }

    #[test]
    fn ignores_comment_lines() {
        let mut parser = EventStreamParser::default();
        assert!(parser.feed(b": keep-alive\n\n").is_empty());
    }

    #[test]
    fn ignores_non_data_fields() {
        let mut parser = EventStreamParser::default();
        assert_eq!(
            parser.feed(b"event: tick\nid: 3\ndata: 1\n\n"),
            vec!["1".to_string()]
        );
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut parser = EventStreamParser::default();
        assert_eq!(parser.feed(b"data: x\r\n\r\n"), vec!["x".to_string()]);
    }

    #[test]
    fn strips_only_one_leading_space() {
        let mut parser = EventStreamParser::default();
        assert_eq!(parser.feed(b"data:  two\n\n"), vec![" two".to_string()]);
        assert_eq!(parser.feed(b"data:none\n\n"), vec!["none".to_string()]);
    }

    #[test]
    fn consecutive_events_come_out_in_order() {
        let mut parser = EventStreamParser::default();
        assert_eq!(
            parser.feed(b"data: 1\n\ndata: 2\n\n"),
            vec!["1".to_string(), "2".to_string()]
        );
    }
}
