//! Backend log tail over server-sent events
//!
//! `/api/logs/stream` emits one JSON [`LogEntry`] per event. Heartbeat
//! entries keep the connection open and are dropped here.

use crate::http::transport_error;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use toggle_core::{ChatError, ErrorBody, LogEntry};

/// Path of the log stream
pub const LOG_STREAM_PATH: &str = "/api/logs/stream";

/// Incremental SSE decoder
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence, so
/// only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create empty decoder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning the data of every event completed by them
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if line.starts_with(':') {
                // comment
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }
}

/// Decode one event payload; heartbeats and malformed payloads yield `None`
#[must_use]
pub fn parse_entry(data: &str) -> Option<LogEntry> {
    match serde_json::from_str::<LogEntry>(data) {
        Ok(entry) if entry.is_heartbeat() => None,
        Ok(entry) => Some(entry),
        Err(err) => {
            tracing::debug!(error = %err, "skipping malformed log event");
            None
        }
    }
}

/// Log stream client
#[derive(Debug, Clone)]
pub struct LogTail {
    client: Client,
    url: String,
}

impl LogTail {
    /// Tail the log stream of a backend
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{LOG_STREAM_PATH}", base_url.trim_end_matches('/')),
        }
    }

    /// Stream URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the stream; it ends when the server closes or a read fails
    ///
    /// # Errors
    /// - `ChatError::Transport` when the backend is unreachable
    /// - `ChatError::Upstream` on non-success answers
    pub async fn stream(&self) -> Result<BoxStream<'static, LogEntry>, ChatError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = ErrorBody::extract(&body)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(ChatError::upstream(status.as_u16(), message));
        }
        tracing::info!(url = %self.url, "log stream opened");

        let bytes = Box::pin(response.bytes_stream());
        let entries = stream::unfold(
            (bytes, SseDecoder::new()),
            |(mut bytes, mut decoder)| async move {
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        let entries: Vec<LogEntry> = decoder
                            .feed(&chunk)
                            .iter()
                            .filter_map(|data| parse_entry(data))
                            .collect();
                        Some((stream::iter(entries), (bytes, decoder)))
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "log stream read failed");
                        None
                    }
                    None => None,
                }
            },
        )
        .flatten();

        Ok(entries.boxed())
    }
}
