//! Realtime Database adapter speaking the REST and server-sent-events protocol.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, StreamExt, future::BoxFuture};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};

use super::{
    EventStream, MultiPathUpdate, RemoteStore, StoreError, StoreEvent, StorePath,
    SubscriptionKind, tree,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FirebaseStore {
    client: Client,
    streaming: Client,
    base_url: String,
    root: StorePath,
    auth: Option<String>,
    connected: Arc<AtomicBool>,
}

impl FirebaseStore {
    pub fn new(base_url: &str, root: &str, auth: Option<String>) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        // event streams stay open indefinitely
        let streaming = Client::builder().build()?;
        Ok(Self {
            client,
            streaming,
            base_url: base_url.trim_end_matches('/').to_owned(),
            root: StorePath::parse(root)?,
            auth,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    fn url(&self, path: &StorePath) -> String {
        let full = [self.root.as_str(), path.as_str()]
            .into_iter()
            .filter(|it| !it.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{full}.json", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        self.connected.store(true, Ordering::SeqCst);
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn do_read_once(&self, path: StorePath) -> Result<Option<Value>, StoreError> {
        let request = self.authorize(self.client.get(self.url(&path)));
        let response = self.send(request).await?;
        let value: Value = response.json().await?;
        Ok(tree::normalize(value))
    }

    async fn do_atomic_update(&self, update: MultiPathUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        debug!("Submitting atomic update of {} paths", update.len());
        let request = self
            .authorize(self.client.patch(self.url(&StorePath::root())))
            .json(&update.to_patch_body());
        self.send(request).await?;
        Ok(())
    }

    async fn do_subscribe(
        &self,
        path: StorePath,
        kind: SubscriptionKind,
    ) -> Result<EventStream, StoreError> {
        let request = self
            .authorize(self.streaming.get(self.url(&path)))
            .header(header::ACCEPT, "text/event-stream");
        let response = self.send(request).await?;
        info!("Subscribed to {path} ({kind:?})");
        Ok(spawn_pump(response, kind, path, self.connected.clone()))
    }
}

impl RemoteStore for FirebaseStore {
    fn read_once(&self, path: StorePath) -> BoxFuture<'_, Result<Option<Value>, StoreError>> {
        self.do_read_once(path).boxed()
    }

    fn subscribe(
        &self,
        path: StorePath,
        kind: SubscriptionKind,
    ) -> BoxFuture<'_, Result<EventStream, StoreError>> {
        self.do_subscribe(path, kind).boxed()
    }

    fn atomic_update(&self, update: MultiPathUpdate) -> BoxFuture<'_, Result<(), StoreError>> {
        self.do_atomic_update(update).boxed()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Forwards the stream's events until it ends, then marks the adapter disconnected.
fn spawn_pump(
    response: Response,
    kind: SubscriptionKind,
    path: StorePath,
    connected: Arc<AtomicBool>,
) -> EventStream {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        pump(response, StreamMirror::new(kind), &tx).await;
        warn!("Event stream for {path} ended");
        connected.store(false, Ordering::SeqCst);
    });
    rx
}

async fn pump(response: Response, mut mirror: StreamMirror, tx: &UnboundedSender<StoreEvent>) {
    let mut parser = SseParser::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                error!("Event stream failed: {err}");
                return;
            }
        };
        for message in parser.feed(&chunk) {
            let events = match mirror.apply(&message) {
                Ok(events) => events,
                Err(reason) => {
                    error!("Event stream closed by server: {reason}");
                    return;
                }
            };
            for event in events {
                if tx.send(event).is_err() {
                    debug!("Subscriber went away, closing event stream");
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder; chunks may split messages anywhere,
/// including inside a multi-byte character. Only complete messages are decoded.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend(chunk.iter().filter(|byte| **byte != b'\r'));
        let mut messages = vec![];
        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&raw);
            let mut message = SseMessage::default();
            let mut data_lines = vec![];
            for line in block.lines() {
                if let Some(event) = line.strip_prefix("event:") {
                    message.event = event.trim().to_owned();
                } else if let Some(data) = line.strip_prefix("data:") {
                    data_lines.push(data.strip_prefix(' ').unwrap_or(data).to_owned());
                }
            }
            message.data = data_lines.join("\n");
            if !message.event.is_empty() || !message.data.is_empty() {
                messages.push(message);
            }
        }
        messages
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Local copy of the subscribed subtree, used to turn put/patch messages into store events.
pub struct StreamMirror {
    kind: SubscriptionKind,
    current: Value,
    initialized: bool,
}

impl StreamMirror {
    pub fn new(kind: SubscriptionKind) -> Self {
        Self {
            kind,
            current: Value::Null,
            initialized: false,
        }
    }

    /// Events produced by one server message, or the reason the server closed the stream.
    pub fn apply(&mut self, message: &SseMessage) -> Result<Vec<StoreEvent>, String> {
        let before = tree::normalize(self.current.clone());
        match message.event.as_str() {
            "put" | "patch" => {
                let payload: StreamPayload = match serde_json::from_str(&message.data) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!("Ignoring undecodable {} message: {err}", message.event);
                        return Ok(vec![]);
                    }
                };
                let Ok(at) = StorePath::parse(&payload.path) else {
                    warn!("Ignoring message for invalid path {}", payload.path);
                    return Ok(vec![]);
                };
                if message.event == "put" {
                    tree::set(&mut self.current, &at, Some(payload.data));
                } else if let Value::Object(children) = payload.data {
                    for (key, value) in children {
                        // patch keys may be nested paths themselves
                        if let Ok(target) = StorePath::parse(&format!("{}/{key}", at.as_str())) {
                            tree::set(&mut self.current, &target, Some(value));
                        }
                    }
                }
            }
            "keep-alive" => return Ok(vec![]),
            "cancel" | "auth_revoked" => return Err(message.event.clone()),
            other => {
                debug!("Ignoring unknown event-stream message {other}");
                return Ok(vec![]);
            }
        }
        let after = tree::normalize(self.current.clone());
        let first = !self.initialized;
        self.initialized = true;
        Ok(match self.kind {
            SubscriptionKind::Children => tree::child_events(before.as_ref(), after.as_ref()),
            SubscriptionKind::Value if first || before != after => vec![StoreEvent::Value(after)],
            SubscriptionKind::Value => vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn put(path: &str, data: Value) -> SseMessage {
        SseMessage {
            event: "put".into(),
            data: json!({"path": path, "data": data}).to_string(),
        }
    }

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: put\ndata: {\"path\"").is_empty());
        let messages = parser.feed(b":\"/\",\"data\":null}\n\nevent: keep-alive\r\ndata: null\r\n\r\n");
        assert_eq!(
            messages,
            vec![
                SseMessage {
                    event: "put".into(),
                    data: "{\"path\":\"/\",\"data\":null}".into()
                },
                SseMessage {
                    event: "keep-alive".into(),
                    data: "null".into()
                },
            ]
        );
    }

    fn split_inside_umlaut() -> (Vec<u8>, Vec<u8>) {
        let message =
            "event: put\ndata: {\"path\":\"/\",\"data\":{\"B1\":{\"customer\":\"Müller\"}}}\n\n";
        let bytes = message.as_bytes();
        let at = message.find('ü').unwrap() + 1;
        (bytes[..at].to_vec(), bytes[at..].to_vec())
    }

    #[test]
    fn test_parser_keeps_characters_split_across_chunks() {
        let (head, tail) = split_inside_umlaut();
        let mut parser = SseParser::default();

        assert!(parser.feed(&head).is_empty());
        let messages = parser.feed(&tail);

        assert_eq!(messages.len(), 1);
        assert!(messages[0].data.contains("Müller"));
    }

    #[tokio::test]
    async fn test_stream_yields_events_then_marks_disconnected() {
        let (head, tail) = split_inside_umlaut();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(head),
            Ok(tail),
            Ok(b"event: keep-alive\ndata: null\n\n".to_vec()),
            Ok(b"event: put\ndata: {\"path\":\"/B2\",\"data\":{\"customer\":\"Co2\"}}\n\n".to_vec()),
        ];
        let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));
        let response = Response::from(http::Response::new(body));
        let connected = Arc::new(AtomicBool::new(true));

        let mut rx = spawn_pump(
            response,
            SubscriptionKind::Children,
            StorePath::parse("activeBowls").unwrap(),
            connected.clone(),
        );
        let mut events = vec![];
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                StoreEvent::Added {
                    key: "B1".into(),
                    value: json!({"customer": "Müller"})
                },
                StoreEvent::Added {
                    key: "B2".into(),
                    value: json!({"customer": "Co2"})
                },
            ]
        );
        assert!(!connected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_transport_error_marks_disconnected() {
        // nothing listens on the discard port
        let store = FirebaseStore::new("http://127.0.0.1:9", "progloveData", None).unwrap();
        store.connected.store(true, Ordering::SeqCst);

        let result = store.read_once(StorePath::parse("lastSync").unwrap()).await;

        assert!(matches!(result, Err(StoreError::Transport(_))));
        assert!(!store.is_connected());
    }

    #[test]
    fn test_children_mirror_replays_then_diffs() {
        let mut mirror = StreamMirror::new(SubscriptionKind::Children);
        let initial = mirror
            .apply(&put("/", json!({"B1": {"dish": "A"}})))
            .unwrap();
        assert_eq!(
            initial,
            vec![StoreEvent::Added {
                key: "B1".into(),
                value: json!({"dish": "A"})
            }]
        );

        let removed = mirror.apply(&put("/B1", Value::Null)).unwrap();
        assert_eq!(removed, vec![StoreEvent::Removed { key: "B1".into() }]);

        let patched = mirror
            .apply(&SseMessage {
                event: "patch".into(),
                data: json!({"path": "/", "data": {"B2": {"dish": "C"}}}).to_string(),
            })
            .unwrap();
        assert_eq!(
            patched,
            vec![StoreEvent::Added {
                key: "B2".into(),
                value: json!({"dish": "C"})
            }]
        );
    }

    #[test]
    fn test_value_mirror_reports_initial_absence() {
        let mut mirror = StreamMirror::new(SubscriptionKind::Value);
        assert_eq!(
            mirror.apply(&put("/", Value::Null)).unwrap(),
            vec![StoreEvent::Value(None)]
        );
        assert!(mirror.apply(&put("/", Value::Null)).unwrap().is_empty());
        assert_eq!(
            mirror.apply(&put("/k", json!(1))).unwrap(),
            vec![StoreEvent::Value(Some(json!({"k": 1})))]
        );
    }

    #[test]
    fn test_cancel_closes_stream() {
        let mut mirror = StreamMirror::new(SubscriptionKind::Value);
        let cancel = SseMessage {
            event: "cancel".into(),
            data: "null".into(),
        };
        assert_eq!(mirror.apply(&cancel), Err("cancel".to_owned()));
    }

    #[test]
    fn test_url_includes_root() {
        let store = FirebaseStore::new("https://db.example.com/", "progloveData", None).unwrap();
        assert_eq!(
            store.url(&StorePath::parse("activeBowls/B1").unwrap()),
            "https://db.example.com/progloveData/activeBowls/B1.json"
        );
        assert_eq!(
            store.url(&StorePath::root()),
            "https://db.example.com/progloveData.json"
        );
    }
}
