//! Server-Sent-Events framing and the agent's event vocabulary.

use serde::Deserialize;
use serde_json::Value;

/// Splits a byte stream into SSE `data` payloads.
///
/// Chunks may cut events (or UTF-8 sequences) anywhere; incomplete input
/// stays buffered until the blank line that ends the event arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = frame_data(&frame[..end]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let frame = std::mem::take(&mut self.buffer);
        frame_data(&frame)
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Events emitted by the agent over a run's SSE stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentEvent {
    Started {
        #[serde(rename = "runId", default)]
        run_id: Option<String>,
    },
    StreamingUrl {
        #[serde(rename = "streamingUrl")]
        streaming_url: String,
    },
    Progress {
        #[serde(default)]
        purpose: Option<String>,
    },
    Heartbeat,
    Complete {
        #[serde(default)]
        status: String,
        #[serde(rename = "resultJson", default)]
        result_json: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
    #[serde(other)]
    Other,
}

impl AgentEvent {
    /// Parses one `data` payload. Unreadable payloads are skipped.
    pub fn parse(data: &str) -> Option<Self> {
        match serde_json::from_str(data) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable agent event");
                None
            }
        }
    }
}

/// Pulls a human-readable message out of an agent `error` field, which may
/// be a bare string or an object with a `message`.
pub fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_events() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"HEART").is_empty());
        let out = decoder.push(b"BEAT\"}\n\ndata: {\"type\":\"PROGRESS\"}\n");
        assert_eq!(out, vec!["{\"type\":\"HEARTBEAT\"}"]);
        let out = decoder.push(b"\n");
        assert_eq!(out, vec!["{\"type\":\"PROGRESS\"}"]);
    }

    #[test]
    fn test_decoder_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b": keep-alive\r\n\r\nevent: message\r\ndata: one\r\ndata: two\r\n\r\n");
        assert_eq!(out, vec!["one\ntwo"]);
    }

    #[test]
    fn test_decoder_keeps_multibyte_across_chunks() {
        let payload = "data: caf\u{e9}\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&payload[..split]).is_empty());
        assert_eq!(decoder.push(&payload[split..]), vec!["caf\u{e9}"]);
    }

    #[test]
    fn test_decoder_finish_flushes_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            AgentEvent::parse(r#"{"type":"STARTED","runId":"run-1"}"#),
            Some(AgentEvent::Started {
                run_id: Some("run-1".to_string())
            })
        );
        assert_eq!(
            AgentEvent::parse(r#"{"type":"STREAMING_URL","streamingUrl":"https://v/1"}"#),
            Some(AgentEvent::StreamingUrl {
                streaming_url: "https://v/1".to_string()
            })
        );
        assert_eq!(
            AgentEvent::parse(r#"{"type":"SOMETHING_NEW","x":1}"#),
            Some(AgentEvent::Other)
        );
        assert_eq!(AgentEvent::parse("not json"), None);

        match AgentEvent::parse(r#"{"type":"COMPLETE","status":"COMPLETED","resultJson":[1]}"#) {
            Some(AgentEvent::Complete {
                status,
                result_json,
                error,
            }) => {
                assert_eq!(status, "COMPLETED");
                assert_eq!(result_json, Some(serde_json::json!([1])));
                assert!(error.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(&serde_json::json!("boom")), "boom");
        assert_eq!(
            error_message(&serde_json::json!({"message": "login wall"})),
            "login wall"
        );
        assert_eq!(error_message(&serde_json::json!({"code": 7})), "{\"code\":7}");
    }
}
