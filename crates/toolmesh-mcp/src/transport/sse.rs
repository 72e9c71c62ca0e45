//! MCP over HTTP + Server-Sent Events.
//!
//! The client keeps one long-lived `GET` open on the SSE endpoint. The first
//! `endpoint` event names the URL that JSON-RPC messages are `POST`ed to, and
//! every response comes back as a `message` event on the stream.

use super::{McpTransport, TransportConnector};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Url;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use toolmesh_core::{ToolMeshError, ToolMeshResult};
use tracing::{debug, info, warn};

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, `message` when absent.
    pub event: String,
    /// All `data:` lines of the event joined with `\n`.
    pub data: String,
}

/// Incremental SSE frame parser.
///
/// Bytes are buffered until a full line is available, so chunk boundaries
/// may fall anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Feeds a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
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
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        Some(SseEvent {
            event: self.event.take().unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// State shared between a transport handle and its stream reader task.
struct Shared {
    endpoint: String,
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
    closed: AtomicBool,
}

impl Shared {
    fn closed_error(&self) -> ToolMeshError {
        ToolMeshError::stream_closed(&self.endpoint, "SSE stream is closed")
    }

    /// Marks the stream closed and fails every waiter.
    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
    }

    /// Registers a waiter for `id`. The entry goes away when the returned
    /// guard drops, whether or not a response arrived.
    fn register(&self, id: u64) -> (PendingEntry<'_>, oneshot::Receiver<JsonRpcResponse>) {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (PendingEntry { shared: self, id }, rx)
    }

    fn route(&self, event: SseEvent) {
        if event.event != "message" {
            debug!(endpoint = %self.endpoint, event = %event.event, "Ignoring SSE event");
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(&event.data) {
            Ok(v) => v,
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, "Non-JSON SSE message");
                return;
            }
        };

        // Server-initiated requests and notifications carry a method.
        if let Some(method) = value.get("method").and_then(serde_json::Value::as_str) {
            debug!(endpoint = %self.endpoint, method, "Ignoring server-initiated message");
            return;
        }

        match serde_json::from_value::<JsonRpcResponse>(value) {
            Ok(resp) => {
                let Some(id) = resp.id else {
                    return;
                };
                match self.pending.lock().remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => debug!(endpoint = %self.endpoint, id, "Response for unknown request id"),
                }
            }
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, "Unparseable JSON-RPC response");
            }
        }
    }
}

struct PendingEntry<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

async fn pump<S, B>(mut stream: S, mut parser: SseParser, backlog: Vec<SseEvent>, shared: Arc<Shared>)
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    for event in backlog {
        shared.route(event);
    }

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for event in parser.push(bytes.as_ref()) {
                    shared.route(event);
                }
            }
            Err(e) => {
                warn!(endpoint = %shared.endpoint, error = %e, "SSE stream read error");
                break;
            }
        }
    }

    debug!(endpoint = %shared.endpoint, "SSE stream ended");
    shared.shut();
}

fn header_map(headers: &HashMap<String, String>) -> ToolMeshResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ToolMeshError::Transport(format!("Invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ToolMeshError::Transport(format!("Invalid value for header '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// A live SSE session with one MCP server.
pub struct SseTransport {
    client: reqwest::Client,
    post_url: Url,
    headers: HeaderMap,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Opens the event stream and waits for the server to announce its
    /// message endpoint.
    pub async fn open(
        client: reqwest::Client,
        endpoint: &str,
        headers: &HashMap<String, String>,
    ) -> ToolMeshResult<Self> {
        let sse_url = Url::parse(endpoint)
            .map_err(|e| ToolMeshError::Transport(format!("Invalid endpoint '{endpoint}': {e}")))?;
        let headers = header_map(headers)?;

        let resp = client
            .get(sse_url.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ToolMeshError::Transport(format!("SSE request to {endpoint} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ToolMeshError::Transport(format!(
                "SSE endpoint {endpoint} returned HTTP {}",
                resp.status()
            )));
        }

        let mut stream = Box::pin(resp.bytes_stream());
        let mut parser = SseParser::default();
        let mut backlog = Vec::new();

        let post_url = loop {
            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Err(ToolMeshError::Transport(format!(
                        "SSE stream from {endpoint} failed: {e}"
                    )))
                }
                None => {
                    return Err(ToolMeshError::stream_closed(
                        endpoint,
                        "stream ended before the endpoint event",
                    ))
                }
            };

            let mut events = parser.push(&chunk).into_iter();
            if let Some(found) = events.by_ref().find(|ev| ev.event == "endpoint") {
                backlog.extend(events);
                break sse_url.join(found.data.trim()).map_err(|e| {
                    ToolMeshError::Protocol(format!(
                        "Invalid message endpoint '{}' from {endpoint}: {e}",
                        found.data
                    ))
                })?;
            }
        };

        debug!(endpoint, post_url = %post_url, "SSE message endpoint discovered");

        let shared = Arc::new(Shared {
            endpoint: endpoint.to_string(),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(pump(stream, parser, backlog, Arc::clone(&shared)));

        info!(endpoint, "SSE transport opened");

        Ok(Self {
            client,
            post_url,
            headers,
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// The URL JSON-RPC messages are posted to.
    pub fn post_url(&self) -> &Url {
        &self.post_url
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> ToolMeshResult<()> {
        let resp = self
            .client
            .post(self.post_url.clone())
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                ToolMeshError::Transport(format!("POST to {} failed: {e}", self.post_url))
            })?;

        if !resp.status().is_success() {
            return Err(ToolMeshError::Transport(format!(
                "POST to {} returned HTTP {}",
                self.post_url,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, request: JsonRpcRequest) -> ToolMeshResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(self.shared.closed_error());
        }

        let (_entry, rx) = self.shared.register(request.id);

        // The reader may have shut down between the check and the insert.
        if !self.is_connected() {
            return Err(self.shared.closed_error());
        }

        self.post(&request).await?;
        rx.await.map_err(|_| self.shared.closed_error())
    }

    async fn notify(&self, notification: JsonRpcNotification) -> ToolMeshResult<()> {
        if !self.is_connected() {
            return Err(self.shared.closed_error());
        }
        self.post(&notification).await
    }

    async fn close(&self) -> ToolMeshResult<()> {
        let reader = self.reader.lock().take();
        let Some(reader) = reader else {
            return Ok(());
        };

        self.shared.shut();
        reader.abort();

        match reader.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => {
                debug!(endpoint = %self.shared.endpoint, "SSE reader stopped");
                Ok(())
            }
            Err(e) => Err(ToolMeshError::Transport(format!(
                "SSE reader for {} panicked: {e}",
                self.shared.endpoint
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// Opens [`SseTransport`]s with a shared HTTP client.
#[derive(Debug, Clone, Default)]
pub struct SseConnector {
    client: reqwest::Client,
}

impl SseConnector {
    /// A connector with a default HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxy, TLS roots, connect timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransportConnector for SseConnector {
    async fn open(
        &self,
        endpoint: &str,
        headers: &HashMap<String, String>,
    ) -> ToolMeshResult<Box<dyn McpTransport>> {
        let transport = SseTransport::open(self.client.clone(), endpoint, headers).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_splits_events() {
        let mut parser = SseParser::default();
        let events = parser.push(
            b"event: endpoint\ndata: /messages?session_id=abc\n\ndata: {\"id\":1}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "endpoint");
        assert_eq!(events[0].data, "/messages?session_id=abc");
        assert_eq!(events[1].event, "message");
        assert_eq!(events[1].data, "{\"id\":1}");
    }

    #[test]
    fn test_parser_handles_split_chunks_and_crlf() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: mess").is_empty());
        assert!(parser.push(b"age\r\ndata: hel").is_empty());
        let events = parser.push(b"lo\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "message".into(),
                data: "hello".into()
            }]
        );
    }

    #[test]
    fn test_parser_joins_multiline_data_and_skips_comments() {
        let mut parser = SseParser::default();
        let events = parser.push(b": keepalive\n\ndata: a\ndata: b\nid: 7\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_parser_keeps_multibyte_char_split_across_chunks() {
        let mut parser = SseParser::default();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        assert!(parser.push(&bytes[..split]).is_empty());
        let events = parser.push(&bytes[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_header_map_rejects_invalid_name() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(header_map(&headers), Err(ToolMeshError::Transport(_))));

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let map = header_map(&headers).unwrap();
        assert_eq!(map.get("authorization").unwrap(), "Bearer t");
    }

    #[test]
    fn test_relative_endpoint_resolution() {
        let base = Url::parse("http://localhost:8080/sse").unwrap();
        let joined = base.join("/messages/?session_id=1").unwrap();
        assert_eq!(joined.as_str(), "http://localhost:8080/messages/?session_id=1");
        let absolute = base.join("http://other:9000/rpc").unwrap();
        assert_eq!(absolute.as_str(), "http://other:9000/rpc");
    }

    #[tokio::test]
    async fn test_route_delivers_to_waiter_and_shut_fails_others() {
        let shared = Shared {
            endpoint: "http://x/sse".into(),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        shared.pending.lock().insert(1, tx1);
        shared.pending.lock().insert(2, tx2);

        shared.route(SseEvent {
            event: "message".into(),
            data: r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.into(),
        });
        shared.route(SseEvent {
            event: "message".into(),
            data: r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#.into(),
        });

        assert_eq!(rx1.await.unwrap().id, Some(1));
        shared.shut();
        assert!(rx2.await.is_err());
        assert!(shared.closed_error().is_stream_closed());
    }

    #[tokio::test]
    async fn test_abandoned_request_releases_its_waiter() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let transport = SseTransport {
            client: reqwest::Client::new(),
            post_url: Url::parse(&format!("{}/messages", server.uri())).unwrap(),
            headers: HeaderMap::new(),
            shared: Arc::new(Shared {
                endpoint: server.uri(),
                pending: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
            reader: Mutex::new(None),
        };

        let call = transport.request(JsonRpcRequest::new(7, "tools/list", None));
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(200), call).await;
        assert!(outcome.is_err(), "no response was ever sent");
        assert!(transport.shared.pending.lock().is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
