//! Streamable HTTP session transport.
//!
//! One [`SessionTransport`] serves one MCP session: it validates the
//! session and protocol headers of every POST, GET and DELETE, dispatches
//! messages to its own [`ServerConn`], and answers with JSON, an SSE
//! stream, or a status code. [`SessionRegistry`] maps session ids to live
//! transports for the remote entry point.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, OnceLock, Weak,
};

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use dashmap::DashMap;
use futures::{stream::FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    connection::ServerConn,
    context::{spawn_with_bearer_token, ServerCtx},
    schema::{
        ClientRequest, JSONRPCError, JSONRPCMessage, JSONRPCNotification, BAD_REQUEST,
        INVALID_PARAMS, INVALID_REQUEST, PARSE_ERROR, RequestDecodeError, SESSION_NOT_FOUND,
        SUPPORTED_PROTOCOL_VERSIONS,
    },
    server::{handle_message, NOTIFICATION_CAPACITY},
};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closing,
    Closed,
}

type CloseCallback = Box<dyn FnOnce(Option<&str>) + Send>;

/// Transport of a single session over streamable HTTP.
pub struct SessionTransport {
    connection: Arc<dyn ServerConn>,
    notification_tx: broadcast::Sender<JSONRPCNotification>,
    session_id: OnceLock<String>,
    state: Mutex<SessionState>,
    on_close: Mutex<Option<CloseCallback>>,
    shutdown: CancellationToken,
    standalone_stream: Arc<AtomicBool>,
}

impl SessionTransport {
    pub fn new(connection: Arc<dyn ServerConn>) -> Self {
        let (notification_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            connection,
            notification_tx,
            session_id: OnceLock::new(),
            state: Mutex::new(SessionState::Active),
            on_close: Mutex::new(None),
            shutdown: CancellationToken::new(),
            standalone_stream: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `callback` once when the transport closes, with the session id
    /// if one was assigned.
    pub fn with_on_close<F>(self, callback: F) -> Self
    where
        F: FnOnce(Option<&str>) + Send + 'static,
    {
        *lock(&self.on_close) = Some(Box::new(callback));
        self
    }

    /// Assigned while handling the `initialize` request.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn context(&self) -> ServerCtx {
        let ctx = ServerCtx::new(self.notification_tx.clone());
        match self.session_id() {
            Some(id) => ctx.with_session_id(id),
            None => ctx,
        }
    }

    /// Handle a POST carrying one message or a batch.
    pub async fn handle_post(&self, headers: &HeaderMap, body: &[u8]) -> Response {
        if self.state() != SessionState::Active {
            return session_not_found();
        }

        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                debug!("Rejecting unparseable body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, PARSE_ERROR, "Parse error: Invalid JSON");
            }
        };
        let messages = match parse_messages(value) {
            Some(messages) => messages,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST,
                    "Invalid Request: Invalid JSON-RPC message",
                )
            }
        };

        if messages.iter().any(JSONRPCMessage::is_initialize) {
            if self.session_id.get().is_some() {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST,
                    "Invalid Request: Server already initialized",
                );
            }
            if messages.len() > 1 {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST,
                    "Invalid Request: Only one initialization request is allowed",
                );
            }
            if let Err(response) = validate_protocol_version(headers) {
                return response;
            }
            if let Some(reason) = messages.iter().find_map(initialize_rejection) {
                debug!("Rejecting malformed initialize: {}", reason);
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_PARAMS,
                    &format!("Invalid params: {reason}"),
                );
            }
            let id = Uuid::new_v4().to_string();
            if self.session_id.set(id.clone()).is_err() {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST,
                    "Invalid Request: Server already initialized",
                );
            }
            info!(session_id = %id, "Session initialized");
        } else if let Err(response) = self.validate_session(headers) {
            return response;
        }

        let ctx = self.context();
        let mut pending = Vec::new();
        for message in messages {
            if message.is_request() {
                let connection = self.connection.clone();
                let ctx = ctx.clone();
                pending.push(spawn_with_bearer_token(async move {
                    handle_message(&*connection, message, &ctx).await
                }));
            } else {
                handle_message(&*self.connection, message, &ctx).await;
            }
        }

        let response = if pending.is_empty() {
            StatusCode::ACCEPTED.into_response()
        } else if accepts_event_stream(headers) {
            let shutdown = self.shutdown.clone();
            let stream = async_stream::stream! {
                let mut pending: FuturesUnordered<_> = pending.into_iter().collect();
                loop {
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => None,
                        next = pending.next() => next,
                    };
                    let Some(joined) = next else { break };
                    match joined {
                        Ok(Some(message)) => yield message_event(&message),
                        Ok(None) => {}
                        Err(e) => error!("Request task failed: {}", e),
                    }
                }
            };
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        } else {
            let mut responses = Vec::with_capacity(pending.len());
            for handle in pending {
                match handle.await {
                    Ok(Some(message)) => responses.push(message),
                    Ok(None) => {}
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(e) => error!("Request task failed: {}", e),
                }
            }
            if responses.len() == 1 {
                Json(responses.remove(0)).into_response()
            } else {
                Json(responses).into_response()
            }
        };
        self.with_session_header(response)
    }

    /// Open the standalone server-to-client SSE stream.
    pub async fn handle_get(&self, headers: &HeaderMap) -> Response {
        if self.state() != SessionState::Active {
            return session_not_found();
        }
        if !accepts_event_stream(headers) {
            return error_response(
                StatusCode::NOT_ACCEPTABLE,
                BAD_REQUEST,
                "Not Acceptable: Client must accept text/event-stream",
            );
        }
        if let Err(response) = self.validate_session(headers) {
            return response;
        }
        if self.standalone_stream.swap(true, Ordering::SeqCst) {
            return error_response(
                StatusCode::CONFLICT,
                BAD_REQUEST,
                "Conflict: Only one SSE stream is allowed per session",
            );
        }

        let guard = StreamSlot(self.standalone_stream.clone());
        let mut notifications = self.notification_tx.subscribe();
        let shutdown = self.shutdown.clone();
        let session_id = self.session_id().unwrap_or_default().to_string();
        debug!(%session_id, "Standalone SSE stream opened");

        let stream = async_stream::stream! {
            let _slot = guard;
            loop {
                let next = tokio::select! {
                    biased;
                    received = notifications.recv() => Some(received),
                    _ = shutdown.cancelled() => None,
                };
                match next {
                    Some(Ok(notification)) => {
                        yield message_event(&JSONRPCMessage::Notification(notification));
                    }
                    Some(Err(RecvError::Lagged(skipped))) => {
                        warn!(%session_id, skipped, "Standalone stream fell behind");
                    }
                    Some(Err(RecvError::Closed)) | None => break,
                }
            }
            debug!(%session_id, "Standalone SSE stream closed");
        };
        self.with_session_header(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
    }

    /// Terminate the session.
    pub async fn handle_delete(&self, headers: &HeaderMap) -> Response {
        if self.state() != SessionState::Active {
            return session_not_found();
        }
        if let Err(response) = self.validate_session(headers) {
            return response;
        }
        self.close();
        StatusCode::OK.into_response()
    }

    /// Close the session: end open streams and fire the close callback.
    /// Calling it again has no effect.
    pub fn close(&self) {
        {
            let mut state = lock(&self.state);
            if *state != SessionState::Active {
                return;
            }
            *state = SessionState::Closing;
        }
        self.shutdown.cancel();
        if let Some(callback) = lock(&self.on_close).take() {
            callback(self.session_id());
        }
        *lock(&self.state) = SessionState::Closed;
        info!(session_id = ?self.session_id(), "Session closed");
    }

    /// Checks for everything but `initialize`: the session exists, the
    /// header names it, and the protocol version is one we speak.
    fn validate_session(&self, headers: &HeaderMap) -> Result<(), Response> {
        let Some(expected) = self.session_id() else {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                BAD_REQUEST,
                "Bad Request: Server not initialized",
            ));
        };
        match headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()) {
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    BAD_REQUEST,
                    "Bad Request: Mcp-Session-Id header is required",
                ))
            }
            Some(id) if id != expected => return Err(session_not_found()),
            Some(_) => {}
        }
        validate_protocol_version(headers)
    }

    fn with_session_header(&self, mut response: Response) -> Response {
        if let Some(value) = self.session_id().and_then(|id| HeaderValue::from_str(id).ok()) {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
        response
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Frees the standalone stream slot when the stream is dropped.
struct StreamSlot(Arc<AtomicBool>);

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Live sessions by id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionTransport>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, session_id: impl Into<String>, transport: Arc<SessionTransport>) {
        self.sessions.insert(session_id.into(), transport);
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.remove(session_id).map(|(_, transport)| transport)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// A close callback that drops the session from this registry. Holds
    /// the map weakly, since the map owns the transport holding it.
    pub fn removal_callback(&self) -> impl FnOnce(Option<&str>) + Send + 'static {
        let sessions: Weak<DashMap<String, Arc<SessionTransport>>> = Arc::downgrade(&self.sessions);
        move |session_id| {
            if let (Some(id), Some(sessions)) = (session_id, sessions.upgrade()) {
                sessions.remove(id);
                debug!(session_id = %id, "Session removed from registry");
            }
        }
    }

    /// Close every registered session.
    pub fn close_all(&self) {
        let transports: Vec<_> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        info!(count = transports.len(), "Closing all sessions");
        for transport in transports {
            transport.close();
        }
    }
}

/// A JSON-RPC error body with no id.
pub(crate) fn error_response(status: StatusCode, code: i32, message: &str) -> Response {
    (status, Json(JSONRPCError::new(None, code, message))).into_response()
}

fn session_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, SESSION_NOT_FOUND, "Session not found")
}

fn validate_protocol_version(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get(PROTOCOL_VERSION_HEADER) {
        Some(version)
            if !version
                .to_str()
                .is_ok_and(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(&v)) =>
        {
            Err(error_response(
                StatusCode::BAD_REQUEST,
                BAD_REQUEST,
                "Bad Request: Unsupported protocol version",
            ))
        }
        _ => Ok(()),
    }
}

pub(crate) fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(EVENT_STREAM))
}

/// Why an `initialize` request would fail to decode, if it would.
fn initialize_rejection(message: &JSONRPCMessage) -> Option<String> {
    match message {
        JSONRPCMessage::Request(request) if request.method == "initialize" => {
            match ClientRequest::from_parts(&request.method, request.params.clone()) {
                Ok(_) => None,
                Err(RequestDecodeError::InvalidParams(reason)) => Some(reason),
                Err(RequestDecodeError::UnknownMethod(method)) => Some(format!("unknown method {method}")),
            }
        }
        _ => None,
    }
}

/// One message or a non-empty batch.
fn parse_messages(value: Value) -> Option<Vec<JSONRPCMessage>> {
    let messages = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<JSONRPCMessage>, _>>()
            .ok()?,
        other => vec![serde_json::from_value(other).ok()?],
    };
    (!messages.is_empty()).then_some(messages)
}

fn message_event(message: &JSONRPCMessage) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(message)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Result,
        schema::{ClientCapabilities, Implementation, InitializeResult},
    };
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Echo;

    #[async_trait]
    impl ServerConn for Echo {
        async fn initialize(
            &self,
            _context: &ServerCtx,
            protocol_version: String,
            _capabilities: ClientCapabilities,
            _client_info: Implementation,
        ) -> Result<InitializeResult> {
            Ok(InitializeResult::new("echo", "0.0.1").with_negotiated_version(&protocol_version))
        }
    }

    fn initialize_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": "2025-03-26", "capabilities": {}, "clientInfo": {"name": "t", "version": "1"}}
        }))
        .unwrap()
    }

    fn headers(session_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(id) = session_id {
            headers.insert(SESSION_ID_HEADER, HeaderValue::from_str(id).unwrap());
        }
        headers
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn initialized() -> (SessionTransport, String) {
        let transport = SessionTransport::new(Arc::new(Echo));
        let response = transport.handle_post(&HeaderMap::new(), &initialize_body()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()[SESSION_ID_HEADER].to_str().unwrap().to_string();
        assert_eq!(transport.session_id(), Some(id.as_str()));
        let body = body_json(response).await;
        assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
        (transport, id)
    }

    #[tokio::test]
    async fn test_initialize_assigns_uuid_session() {
        let (transport, id) = initialized().await;
        assert!(Uuid::parse_str(&id).is_ok());

        let again = transport.handle_post(&headers(Some(&id)), &initialize_body()).await;
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);
        let body = body_json(again).await;
        assert_eq!(body["error"]["code"], INVALID_REQUEST);
        assert_eq!(body["error"]["message"], "Invalid Request: Server already initialized");
    }

    #[tokio::test]
    async fn test_initialize_must_be_alone() {
        let transport = SessionTransport::new(Arc::new(Echo));
        let init: Value = serde_json::from_slice(&initialize_body()).unwrap();
        let batch = json!([init, {"jsonrpc": "2.0", "id": 2, "method": "ping"}]);
        let response = transport
            .handle_post(&HeaderMap::new(), &serde_json::to_vec(&batch).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Invalid Request: Only one initialization request is allowed");
        assert_eq!(transport.session_id(), None);
    }

    #[tokio::test]
    async fn test_malformed_initialize_assigns_no_session() {
        let transport = SessionTransport::new(Arc::new(Echo));
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let response = transport.handle_post(&HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(SESSION_ID_HEADER).is_none());
        assert_eq!(body_json(response).await["error"]["code"], INVALID_PARAMS);
        assert_eq!(transport.session_id(), None);
    }

    #[tokio::test]
    async fn test_header_validation() {
        let fresh = SessionTransport::new(Arc::new(Echo));
        let ping = br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;
        let response = fresh.handle_post(&HeaderMap::new(), ping).await;
        assert_eq!(body_json(response).await["error"]["message"], "Bad Request: Server not initialized");

        let (transport, id) = initialized().await;
        let response = transport.handle_post(&HeaderMap::new(), ping).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], BAD_REQUEST);

        let response = transport.handle_post(&headers(Some("someone-else")), ping).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let mut versioned = headers(Some(&id));
        versioned.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static("1999-01-01"));
        let response = transport.handle_post(&versioned, ping).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["message"], "Bad Request: Unsupported protocol version");

        let response = transport.handle_post(&headers(Some(&id)), b"{oops").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], PARSE_ERROR);

        let null_id = br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#;
        let response = transport.handle_post(&headers(Some(&id)), null_id).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_json_responses() {
        let (transport, id) = initialized().await;

        let note = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let response = transport.handle_post(&headers(Some(&id)), note).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let ping = br#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#;
        let body = body_json(transport.handle_post(&headers(Some(&id)), ping).await).await;
        assert_eq!(body, json!({"jsonrpc": "2.0", "id": "p", "result": {}}));

        let batch = br#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","id":2,"method":"nope"}]"#;
        let body = body_json(transport.handle_post(&headers(Some(&id)), batch).await).await;
        assert_eq!(body[0]["id"], 1);
        assert_eq!(body[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_sse_response() {
        let (transport, id) = initialized().await;
        let mut sse = headers(Some(&id));
        sse.insert(header::ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));

        let response = transport
            .handle_post(&sse, br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#)
            .await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], EVENT_STREAM);
        assert_eq!(response.headers()[SESSION_ID_HEADER], id.as_str());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: message"));
        assert!(text.contains(r#"data: {"jsonrpc":"2.0","id":7,"result":{}}"#));
    }

    #[tokio::test]
    async fn test_standalone_stream_rules() {
        let (transport, id) = initialized().await;
        let response = transport.handle_get(&headers(Some(&id))).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

        let mut sse = headers(Some(&id));
        sse.insert(header::ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        let first = transport.handle_get(&sse).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = transport.handle_get(&sse).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);

        drop(first);
        assert_eq!(transport.handle_get(&sse).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_standalone_stream_ends_on_close() {
        let (transport, id) = initialized().await;
        let mut sse = headers(Some(&id));
        sse.insert(header::ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        let response = transport.handle_get(&sse).await;

        transport.context().notify("notifications/tools/list_changed", None).unwrap();
        transport.close();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("notifications/tools/list_changed"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let transport = SessionTransport::new(Arc::new(Echo)).with_on_close(move |id| {
            assert!(id.is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let response = transport.handle_post(&HeaderMap::new(), &initialize_body()).await;
        let id = response.headers()[SESSION_ID_HEADER].to_str().unwrap().to_string();

        let response = transport.handle_delete(&headers(Some(&id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        transport.close();
        assert_eq!(transport.state(), SessionState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let ping = br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;
        let response = transport.handle_post(&headers(Some(&id)), ping).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], SESSION_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_registry_removes_closed_sessions() {
        let registry = SessionRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let transport = Arc::new(SessionTransport::new(Arc::new(Echo)).with_on_close(registry.removal_callback()));
            let response = transport.handle_post(&HeaderMap::new(), &initialize_body()).await;
            assert_eq!(response.status(), StatusCode::OK);
            let id = transport.session_id().unwrap().to_string();
            registry.insert(id.clone(), transport);
            ids.push(id);
        }
        assert_eq!(registry.len(), 3);

        registry.get(&ids[0]).unwrap().close();
        assert!(registry.get(&ids[0]).is_none());
        assert_eq!(registry.len(), 2);

        let survivor = registry.get(&ids[1]).unwrap();
        registry.close_all();
        assert!(registry.is_empty());
        assert_eq!(survivor.state(), SessionState::Closed);
    }
}
