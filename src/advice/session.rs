use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::dto::AdviceRequest;
use super::stream::{consume, StreamEvent, StreamTranscript};
use crate::error::{ApiError, ClientError, ClientResult};
use crate::http::HttpClient;
use crate::meals::api::ImageUpload;
use crate::store::THREAD_ID_KEY;

pub const EMPTY_REPLY: &str = "I apologize, but I couldn't generate a response. Please try again.";
pub const FAILED_REPLY: &str = "Sorry, I encountered an error. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Completed,
    /// The stream ended without a single token.
    Empty,
    /// The request failed or the server reported an error before any token.
    Failed(String),
    /// Superseded by a newer turn or cancelled by the caller.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// Text to display: the streamed tokens, or a fixed apology.
    pub text: String,
    pub thread_id: Option<String>,
    pub outcome: ReplyOutcome,
}

impl ChatReply {
    fn from_transcript(t: StreamTranscript) -> Self {
        let outcome = if t.cancelled {
            ReplyOutcome::Cancelled
        } else if !t.text.is_empty() {
            ReplyOutcome::Completed
        } else if let Some(err) = t.errors.into_iter().next() {
            ReplyOutcome::Failed(err)
        } else {
            ReplyOutcome::Empty
        };
        let text = match &outcome {
            ReplyOutcome::Empty => EMPTY_REPLY.to_string(),
            ReplyOutcome::Failed(_) => FAILED_REPLY.to_string(),
            _ => t.text,
        };
        Self {
            text,
            thread_id: t.thread_id,
            outcome,
        }
    }

    fn failed(err: &ApiError, thread_id: Option<String>) -> Self {
        Self {
            text: FAILED_REPLY.to_string(),
            thread_id,
            outcome: ReplyOutcome::Failed(err.detail.clone()),
        }
    }
}

/// Chat with the advisor. At most one reply is read at a time: a new turn
/// cancels the one still streaming.
pub struct ChatSession {
    http: HttpClient,
    current: Mutex<Option<CancellationToken>>,
    /// Latest thread id announced by the server, ahead of the store write.
    announced: Mutex<Option<String>>,
}

impl ChatSession {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            current: Mutex::new(None),
            announced: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stops the reply being read, if any.
    pub fn cancel(&self) -> bool {
        let token = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Starts a fresh conversation on the next turn.
    pub async fn reset(&self) -> ClientResult<()> {
        self.cancel();
        self.announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.http.store().remove(THREAD_ID_KEY).await?;
        info!("chat thread reset");
        Ok(())
    }

    pub async fn thread_id(&self) -> ClientResult<Option<String>> {
        let announced = self
            .announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match announced {
            Some(id) => Ok(Some(id)),
            None => Ok(self.http.store().get(THREAD_ID_KEY).await?),
        }
    }

    fn announce(&self, id: &str) {
        *self.announced.lock().unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
    }

    /// Writes `id` unless a later turn has announced another one since.
    async fn persist_thread(&self, id: &str) -> ClientResult<()> {
        let latest = self
            .announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if latest.as_deref() == Some(id) {
            self.http.store().set(THREAD_ID_KEY, id).await?;
        }
        Ok(())
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            info!("superseding reply still in flight");
            previous.cancel();
        }
        token
    }

    fn end(&self, token: &CancellationToken) {
        // a cancelled token was already replaced or taken
        if !token.is_cancelled() {
            self.current
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }

    /// Sends one user turn and reads the streamed reply, passing every event
    /// to `on_event` as it arrives.
    #[instrument(skip(self, image, on_event), fields(has_image = image.is_some()))]
    pub async fn send<F>(
        &self,
        query: &str,
        image: Option<ImageUpload>,
        on_event: F,
    ) -> ClientResult<ChatReply>
    where
        F: FnMut(&StreamEvent),
    {
        let form = AdviceRequest {
            thread_id: self.thread_id().await?,
            user_query: query.to_string(),
            image,
        }
        .into_form()?;

        let token = self.begin();
        let reply = self.read_reply(form, &token, on_event).await;
        self.end(&token);
        let reply = reply?;

        match &reply.outcome {
            ReplyOutcome::Failed(detail) => warn!(%detail, "advice reply failed"),
            outcome => info!(?outcome, chars = reply.text.chars().count(), "advice reply"),
        }
        Ok(reply)
    }

    async fn read_reply<F>(
        &self,
        form: reqwest::multipart::Form,
        token: &CancellationToken,
        mut on_event: F,
    ) -> ClientResult<ChatReply>
    where
        F: FnMut(&StreamEvent),
    {
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Ok(ChatReply::from_transcript(StreamTranscript {
                    cancelled: true,
                    ..Default::default()
                }));
            }
            opened = self.http.open_stream("/advice/stream", form) => opened,
        };
        let resp = match opened {
            Ok(resp) => resp,
            Err(ClientError::Api(err)) => return Ok(ChatReply::failed(&err, None)),
            Err(other) => return Err(other),
        };

        let mut seen_thread = None;
        let consumed = consume(resp.bytes_stream(), token, |event| {
            if let StreamEvent::ThreadId(id) = event {
                self.announce(id);
                seen_thread = Some(id.clone());
            }
            on_event(event);
        })
        .await;
        // kept even when the stream breaks after the id arrived
        if let Some(id) = &seen_thread {
            self.persist_thread(id).await?;
        }
        match consumed {
            Ok(transcript) => Ok(ChatReply::from_transcript(transcript)),
            Err(e) => Ok(ChatReply::failed(&ApiError::from_reqwest(&e), seen_thread)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        extract::Multipart,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use serde_json::json;

    use super::*;
    use crate::store::KeyValueStore;
    use crate::test_support::{http_for, spawn_backend};

    fn token_line(text: &str) -> String {
        format!("data: {}\n\n", json!({"type": "token", "content": text}))
    }

    async fn fields(mut mp: Multipart) -> HashMap<String, String> {
        let mut out = HashMap::new();
        while let Some(field) = mp.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            out.insert(name, field.text().await.unwrap_or_default());
        }
        out
    }

    #[tokio::test]
    async fn reply_is_streamed_and_thread_id_kept() {
        let seen: Arc<std::sync::Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let sink = seen.clone();
        let app = Router::new().route(
            "/advice/stream",
            post(move |mp: Multipart| {
                let sink = sink.clone();
                async move {
                    let f = fields(mp).await;
                    sink.lock().unwrap().push(f);
                    format!(
                        "thread_id: t-42\n\n{}{}data: {{\"type\":\"complete\"}}\n\ndata: [DONE]\n\n",
                        token_line("Eat "),
                        token_line("greens."),
                    )
                }
            }),
        );
        let base = spawn_backend(app).await;
        let (http, store) = http_for(&base);
        let chat = ChatSession::new(http);

        let mut tokens = Vec::new();
        let reply = chat
            .send("what now?", None, |e| {
                if let StreamEvent::Token(t) = e {
                    tokens.push(t.clone());
                }
            })
            .await
            .unwrap();
        assert_eq!(reply.text, "Eat greens.");
        assert_eq!(reply.outcome, ReplyOutcome::Completed);
        assert_eq!(tokens, vec!["Eat ", "greens."]);
        assert_eq!(store.get(THREAD_ID_KEY).await.unwrap().as_deref(), Some("t-42"));
        assert!(!chat.is_busy());

        chat.send("and later?", None, |_| {}).await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].get("thread_id"), None);
        assert_eq!(seen[0]["user_query"], "what now?");
        assert_eq!(seen[1]["thread_id"], "t-42");

        chat.reset().await.unwrap();
        assert_eq!(chat.thread_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn tokenless_stream_gets_apology() {
        let app = Router::new().route(
            "/advice/stream",
            post(|| async { "data: {\"type\":\"complete\"}\n\ndata: [DONE]\n\n" }),
        );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);

        let reply = ChatSession::new(http).send("hi", None, |_| {}).await.unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Empty);
        assert_eq!(reply.text, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn server_error_event_or_status_fails_the_turn() {
        let app = Router::new()
            .route(
                "/advice/stream",
                post(|| async {
                    "data: {\"type\":\"error\",\"content\":\"model overloaded\"}\n\ndata: [DONE]\n\n"
                }),
            );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);
        let reply = ChatSession::new(http).send("hi", None, |_| {}).await.unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Failed("model overloaded".into()));
        assert_eq!(reply.text, FAILED_REPLY);

        let app = Router::new().route(
            "/advice/stream",
            post(|| async {
                (StatusCode::NOT_FOUND, Json(json!({"detail": "User not found"})))
            }),
        );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);
        let reply = ChatSession::new(http).send("hi", None, |_| {}).await.unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Failed("User not found".into()));
        assert_eq!(reply.text, FAILED_REPLY);
    }

    #[tokio::test]
    async fn new_turn_cancels_the_one_in_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/advice/stream",
            post(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        // first reply stalls after one token
                        let head = stream::iter(vec![Ok::<_, Infallible>(Bytes::from(
                            token_line("slow"),
                        ))]);
                        Body::from_stream(head.chain(stream::pending())).into_response()
                    } else {
                        Response::new(Body::from(token_line("fast")))
                    }
                }
            }),
        );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);
        let chat = Arc::new(ChatSession::new(http));

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let first = {
            let chat = chat.clone();
            tokio::spawn(async move {
                let mut started = Some(started_tx);
                chat.send("one", None, move |e| {
                    if matches!(e, StreamEvent::Token(_)) {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(());
                        }
                    }
                })
                .await
            })
        };
        started_rx.await.unwrap();
        assert!(chat.is_busy());

        let second = chat.send("two", None, |_| {}).await.unwrap();
        assert_eq!(second.text, "fast");
        assert_eq!(second.outcome, ReplyOutcome::Completed);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.outcome, ReplyOutcome::Cancelled);
        assert_eq!(first.text, "slow");
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn thread_id_survives_a_broken_stream() {
        let app = Router::new().route(
            "/advice/stream",
            post(|| async {
                let head = stream::iter(vec![
                    Ok::<_, std::io::Error>(Bytes::from("thread_id: t-77\n\n")),
                    Ok(Bytes::from(token_line("Half"))),
                ]);
                let broken = stream::once(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "backend died"))
                });
                Body::from_stream(head.chain(broken)).into_response()
            }),
        );
        let base = spawn_backend(app).await;
        let (http, store) = http_for(&base);
        let chat = ChatSession::new(http);

        let reply = chat.send("hi", None, |_| {}).await.unwrap();
        assert!(matches!(reply.outcome, ReplyOutcome::Failed(_)));
        assert_eq!(reply.text, FAILED_REPLY);
        assert_eq!(reply.thread_id.as_deref(), Some("t-77"));
        assert_eq!(store.get(THREAD_ID_KEY).await.unwrap().as_deref(), Some("t-77"));
    }

    #[tokio::test]
    async fn superseding_turn_reuses_announced_thread() {
        let seen: Arc<std::sync::Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let sink = seen.clone();
        let app = Router::new().route(
            "/advice/stream",
            post(move |mp: Multipart| {
                let sink = sink.clone();
                async move {
                    let f = fields(mp).await;
                    let first = {
                        let mut seen = sink.lock().unwrap();
                        seen.push(f);
                        seen.len() == 1
                    };
                    if first {
                        let head = stream::iter(vec![
                            Ok::<_, Infallible>(Bytes::from("thread_id: t-5\n\n")),
                            Ok(Bytes::from(token_line("slow"))),
                        ]);
                        Body::from_stream(head.chain(stream::pending())).into_response()
                    } else {
                        Response::new(Body::from(token_line("fast")))
                    }
                }
            }),
        );
        let base = spawn_backend(app).await;
        let (http, store) = http_for(&base);
        let chat = Arc::new(ChatSession::new(http));

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let first = {
            let chat = chat.clone();
            tokio::spawn(async move {
                let mut started = Some(started_tx);
                chat.send("one", None, move |e| {
                    if matches!(e, StreamEvent::Token(_)) {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(());
                        }
                    }
                })
                .await
            })
        };
        started_rx.await.unwrap();

        let second = chat.send("two", None, |_| {}).await.unwrap();
        assert_eq!(second.outcome, ReplyOutcome::Completed);
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.outcome, ReplyOutcome::Cancelled);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].get("thread_id"), None);
        assert_eq!(seen[1]["thread_id"], "t-5");
        assert_eq!(store.get(THREAD_ID_KEY).await.unwrap().as_deref(), Some("t-5"));
    }

    #[tokio::test]
    async fn cancel_from_the_event_callback_stops_the_reply() {
        let app = Router::new().route(
            "/advice/stream",
            post(|| async {
                let head = stream::iter(vec![Ok::<_, Infallible>(Bytes::from(token_line("one")))]);
                Body::from_stream(head.chain(stream::pending())).into_response()
            }),
        );
        let base = spawn_backend(app).await;
        let (http, _store) = http_for(&base);
        let chat = ChatSession::new(http);

        let reply = chat
            .send("hi", None, |e| {
                if matches!(e, StreamEvent::Token(_)) {
                    chat.cancel();
                }
            })
            .await
            .unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Cancelled);
        assert_eq!(reply.text, "one");
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn explicit_cancel_without_turn_is_noop() {
        let (http, _store) = http_for("http://127.0.0.1:9");
        let chat = ChatSession::new(http);
        assert!(!chat.cancel());
    }
}
