//! Line protocol of `POST /advice/stream`.
//!
//! The body is plain text split on `\n`. A `thread_id:` line names the
//! conversation, `data: ` lines carry a JSON event or the `[DONE]` sentinel,
//! and everything else is padding.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const THREAD_PREFIX: &str = "thread_id:";
const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ThreadId(String),
    Token(String),
    Progress {
        step: Option<String>,
        message: Option<String>,
    },
    Complete,
    Error(String),
    ImageUploaded(Value),
    Warning(String),
    /// Pipeline milestones such as `vision_complete` or `advisor_start`.
    Stage {
        kind: String,
        data: Option<Value>,
    },
    Done,
    /// A `data:` line whose payload is not a recognizable event.
    Unparsed(String),
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

fn content_text(content: Option<Value>) -> String {
    match content {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Classifies one line. `None` means the line carries nothing.
pub fn classify(line: &str) -> Option<StreamEvent> {
    if let Some(rest) = line.strip_prefix(THREAD_PREFIX) {
        let id = rest.trim();
        return (!id.is_empty()).then(|| StreamEvent::ThreadId(id.to_string()));
    }
    let data = line.strip_prefix(DATA_PREFIX)?.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }
    let Ok(payload) = serde_json::from_str::<Payload>(data) else {
        return Some(StreamEvent::Unparsed(data.to_string()));
    };
    let event = match payload.kind.as_str() {
        "token" => match payload.content {
            Some(Value::String(s)) => StreamEvent::Token(s),
            _ => StreamEvent::Unparsed(data.to_string()),
        },
        "progress" => StreamEvent::Progress {
            step: payload.step,
            message: payload.message,
        },
        "complete" => StreamEvent::Complete,
        "error" => StreamEvent::Error(content_text(payload.content)),
        "warning" => StreamEvent::Warning(content_text(payload.content)),
        "image_uploaded" => StreamEvent::ImageUploaded(payload.content.unwrap_or(Value::Null)),
        _ => StreamEvent::Stage {
            kind: payload.kind,
            data: payload.data,
        },
    };
    Some(event)
}

/// Reassembles lines across arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|&b| b == b'\n') {
            lines.push(decode_line(&self.buf[start..start + pos]));
            start += pos + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Whatever follows the last newline once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = decode_line(&self.buf);
        self.buf.clear();
        Some(line)
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// What one streamed reply amounted to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamTranscript {
    pub thread_id: Option<String>,
    pub text: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub completed: bool,
    pub done: bool,
    pub cancelled: bool,
    pub unparsed: usize,
}

impl StreamTranscript {
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ThreadId(id) => self.thread_id = Some(id.clone()),
            StreamEvent::Token(t) => self.text.push_str(t),
            StreamEvent::Complete => self.completed = true,
            StreamEvent::Done => self.done = true,
            StreamEvent::Error(e) => self.errors.push(e.clone()),
            StreamEvent::Warning(w) => self.warnings.push(w.clone()),
            StreamEvent::Unparsed(_) => self.unparsed += 1,
            StreamEvent::Progress { .. }
            | StreamEvent::Stage { .. }
            | StreamEvent::ImageUploaded(_) => {}
        }
    }
}

/// Reads `body` to the end, or until `cancel` fires, feeding each event to
/// `on_event` as it arrives.
pub async fn consume<S, E, F>(
    body: S,
    cancel: &CancellationToken,
    mut on_event: F,
) -> Result<StreamTranscript, E>
where
    S: Stream<Item = Result<Bytes, E>>,
    F: FnMut(&StreamEvent),
{
    let mut body = std::pin::pin!(body);
    let mut splitter = LineSplitter::new();
    let mut transcript = StreamTranscript::default();
    let mut handle = |line: &str, transcript: &mut StreamTranscript| {
        if let Some(event) = classify(line) {
            if let StreamEvent::Unparsed(raw) = &event {
                warn!(line = %raw, "unparsed stream payload");
            }
            transcript.apply(&event);
            on_event(&event);
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream read cancelled");
                transcript.cancelled = true;
                return Ok(transcript);
            }
            next = body.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                for line in splitter.push(&chunk) {
                    handle(&line, &mut transcript);
                }
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }
    if let Some(line) = splitter.finish() {
        handle(&line, &mut transcript);
    }
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::stream;
    use serde_json::json;

    use super::*;

    const BODY: &str = "thread_id: user_1_thread_ab12\n\n\
        data: {\"type\":\"progress\",\"step\":\"routing\",\"message\":\"Đang phân tích\"}\n\n\
        data: {\"type\":\"advisor_start\"}\n\n\
        data: {\"type\":\"token\",\"content\":\"Xin \"}\n\n\
        data: {\"type\":\"token\",\"content\":\"chào 🍜\"}\r\n\
        data: {not json\n\
        : keep-alive\n\
        data: {\"type\":\"complete\"}\n\n\
        data: [DONE]\n\n";

    async fn run(chunks: Vec<Vec<u8>>) -> (StreamTranscript, Vec<StreamEvent>) {
        let body = stream::iter(chunks.into_iter().map(|c| Ok::<_, Infallible>(Bytes::from(c))));
        let mut events = Vec::new();
        let t = consume(body, &CancellationToken::new(), |e| events.push(e.clone()))
            .await
            .unwrap();
        (t, events)
    }

    #[test]
    fn classifies_each_line_kind() {
        assert_eq!(
            classify("thread_id:  abc "),
            Some(StreamEvent::ThreadId("abc".into()))
        );
        assert_eq!(classify("thread_id:"), None);
        assert_eq!(
            classify(r#"data: {"type":"token","content":"hi"}"#),
            Some(StreamEvent::Token("hi".into()))
        );
        assert_eq!(classify("data: [DONE]"), Some(StreamEvent::Done));
        assert_eq!(
            classify(r#"data: {"type":"error","content":"quota"}"#),
            Some(StreamEvent::Error("quota".into()))
        );
        assert_eq!(
            classify(r#"data: {"type":"image_uploaded","content":{"url":"u"}}"#),
            Some(StreamEvent::ImageUploaded(json!({"url": "u"})))
        );
        assert_eq!(
            classify(r#"data: {"type":"token","content":5}"#),
            Some(StreamEvent::Unparsed(r#"{"type":"token","content":5}"#.into()))
        );
        assert_eq!(classify(""), None);
        assert_eq!(classify(": comment"), None);
        assert_eq!(classify("event: ping"), None);
    }

    #[tokio::test]
    async fn tokens_concatenate_in_line_order() {
        let (t, events) = run(vec![BODY.as_bytes().to_vec()]).await;
        assert_eq!(t.thread_id.as_deref(), Some("user_1_thread_ab12"));
        assert_eq!(t.text, "Xin chào 🍜");
        assert!(t.completed && t.done && !t.cancelled);
        assert_eq!(t.unparsed, 1);
        assert!(events.contains(&StreamEvent::Stage {
            kind: "advisor_start".into(),
            data: None
        }));
    }

    #[tokio::test]
    async fn result_does_not_depend_on_chunking() {
        let bytes = BODY.as_bytes();
        let (whole, _) = run(vec![bytes.to_vec()]).await;

        let (single_bytes, _) = run(bytes.iter().map(|b| vec![*b]).collect()).await;
        assert_eq!(single_bytes, whole);

        for cut in (1..bytes.len()).step_by(7) {
            let (split, _) = run(vec![bytes[..cut].to_vec(), bytes[cut..].to_vec()]).await;
            assert_eq!(split, whole, "split at byte {cut}");
        }
    }

    #[tokio::test]
    async fn done_and_garbage_change_nothing() {
        let clean = "data: {\"type\":\"token\",\"content\":\"ok\"}\n";
        let noisy = format!("data: [DONE]\ndata: {{oops\n{clean}data: [DONE]\n");
        let (a, _) = run(vec![clean.as_bytes().to_vec()]).await;
        let (b, _) = run(vec![noisy.into_bytes()]).await;
        assert_eq!(a.text, b.text);
        assert!(a.errors.is_empty() && b.errors.is_empty());
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_read() {
        let (t, _) = run(vec![b"data: {\"type\":\"token\",\"content\":\"end\"}".to_vec()]).await;
        assert_eq!(t.text, "end");
    }

    #[tokio::test]
    async fn cancelled_read_stops_and_keeps_partial_text() {
        let first = stream::iter(vec![Ok::<_, Infallible>(Bytes::from_static(
            b"data: {\"type\":\"token\",\"content\":\"par\"}\n",
        ))]);
        let body = first.chain(stream::pending());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let t = consume(body, &cancel, |e| {
            if matches!(e, StreamEvent::Token(_)) {
                trigger.cancel();
            }
        })
        .await
        .unwrap();
        assert!(t.cancelled);
        assert_eq!(t.text, "par");
    }

    #[tokio::test]
    async fn transport_error_is_returned() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"content\":\"a\"}\n")),
            Err("connection reset"),
        ]);
        let err = consume(body, &CancellationToken::new(), |_| {}).await.unwrap_err();
        assert_eq!(err, "connection reset");
    }
}
