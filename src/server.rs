use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, mpsc},
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::{
    codec::{Frame, JsonRpcCodec},
    connection::ServerConn,
    context::ServerCtx,
    error::{Error, Result},
    schema::{
        ClientNotification, ClientRequest, JSONRPCError, JSONRPCMessage, JSONRPCNotification,
        JSONRPCRequest, JSONRPCResponse, RequestDecodeError, INTERNAL_ERROR, JSONRPC_VERSION,
    },
};

/// Capacity of the per-connection server notification channel.
pub(crate) const NOTIFICATION_CAPACITY: usize = 100;

type ConnectionFactory = dyn Fn() -> Box<dyn ServerConn> + Send + Sync;

/// An MCP server: a factory producing one [`ServerConn`] per session, plus
/// the stdio serving loop. The HTTP transport lives in [`crate::http`].
#[derive(Clone)]
pub struct Server {
    connection_factory: Arc<ConnectionFactory>,
}

impl Server {
    /// Build a server from a connection factory, called once per session.
    pub fn with_connection<C, F>(factory: F) -> Self
    where
        C: ServerConn + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            connection_factory: Arc::new(move || Box::new(factory()) as Box<dyn ServerConn>),
        }
    }

    pub(crate) fn new_connection(&self) -> Arc<dyn ServerConn> {
        Arc::from((self.connection_factory)())
    }

    /// Serve a single connection over stdin/stdout until EOF.
    pub async fn serve_stdio(self) -> Result<()> {
        self.serve_stream(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC over any reader/writer pair.
    ///
    /// Requests are handled concurrently and answered as they complete. The
    /// loop ends on EOF; in-flight requests are still answered.
    pub async fn serve_stream<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut stream = FramedRead::new(reader, JsonRpcCodec::new());
        let mut sink = FramedWrite::new(writer, JsonRpcCodec::new());

        let connection = self.new_connection();
        let (notification_tx, mut notification_rx) = broadcast::channel(NOTIFICATION_CAPACITY);
        let ctx = ServerCtx::new(notification_tx);

        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<JSONRPCMessage>();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = response_rx.recv().await {
                sink.send(message).await?;
            }
            Ok::<_, Error>(())
        });

        info!("MCP server started on stdio");

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Message(message))) => {
                        let conn = connection.clone();
                        let ctx = ctx.clone();
                        let tx = response_tx.clone();
                        tokio::spawn(async move {
                            if let Some(response) = handle_message(&*conn, message, &ctx).await {
                                if tx.send(response).is_err() {
                                    error!("Failed to queue response: writer closed");
                                }
                            }
                        });
                    }
                    Some(Ok(Frame::Invalid { code, message })) => {
                        warn!(code, "Rejecting malformed message");
                        let _ = response_tx.send(JSONRPCMessage::Error(JSONRPCError::new(None, code, message)));
                    }
                    Some(Err(e)) => {
                        error!("Error reading message: {}", e);
                        break;
                    }
                    None => {
                        info!("Client disconnected");
                        break;
                    }
                },
                notification = notification_rx.recv() => match notification {
                    Ok(notification) => {
                        let _ = response_tx.send(JSONRPCMessage::Notification(notification));
                    }
                    Err(e) => debug!("Notification channel: {}", e),
                },
            }
        }

        drop(response_tx);
        drop(ctx);
        writer_task
            .await
            .map_err(|e| Error::InternalError(format!("Writer task failed: {e}")))??;
        info!("MCP server stopped");
        Ok(())
    }
}

/// Handle one inbound message, returning the message to send back, if any.
pub(crate) async fn handle_message(
    connection: &dyn ServerConn,
    message: JSONRPCMessage,
    context: &ServerCtx,
) -> Option<JSONRPCMessage> {
    match message {
        JSONRPCMessage::Request(request) => Some(handle_request(connection, request, context).await),
        JSONRPCMessage::Notification(notification) => {
            if let Err(e) = handle_notification(connection, notification, context).await {
                error!("Error handling notification: {}", e);
            }
            None
        }
        JSONRPCMessage::Response(response) => {
            debug!("Ignoring response from client: {:?}", response.id);
            None
        }
        JSONRPCMessage::Error(error) => {
            debug!("Ignoring error from client: {:?}", error.id);
            None
        }
    }
}

/// Handle a request using the connection and convert the result to a message
async fn handle_request(
    connection: &dyn ServerConn,
    request: JSONRPCRequest,
    context: &ServerCtx,
) -> JSONRPCMessage {
    debug!(id = ?request.id, method = %request.method, "Server handling request");
    let ctx = context.with_request_id(request.id.clone());
    let id = request.id.clone();

    match handle_request_inner(connection, request, &ctx).await {
        Ok(result) => JSONRPCMessage::Response(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }),
        Err(e) => {
            if let Some(jsonrpc_error) = e.to_jsonrpc_response(id.clone()) {
                JSONRPCMessage::Error(jsonrpc_error)
            } else {
                warn!(id = ?id, "Request failed: {}", e);
                JSONRPCMessage::Error(JSONRPCError::new(Some(id), INTERNAL_ERROR, e.to_string()))
            }
        }
    }
}

async fn handle_request_inner(
    conn: &dyn ServerConn,
    request: JSONRPCRequest,
    ctx: &ServerCtx,
) -> Result<Value> {
    let client_request = ClientRequest::from_parts(&request.method, request.params).map_err(|e| match e {
        RequestDecodeError::UnknownMethod(method) => Error::MethodNotFound(method),
        RequestDecodeError::InvalidParams(reason) => {
            Error::InvalidParams(format!("Invalid parameters for {}: {}", request.method, reason))
        }
    })?;

    match client_request {
        ClientRequest::Initialize {
            protocol_version,
            capabilities,
            client_info,
        } => {
            info!(client = %client_info.name, version = %protocol_version, "Client initializing");
            to_value(conn.initialize(ctx, protocol_version, capabilities, client_info).await?)
        }
        ClientRequest::Ping => conn.pong(ctx).await.map(|_| serde_json::json!({})),
        ClientRequest::ListTools { cursor } => to_value(conn.list_tools(ctx, cursor).await?),
        ClientRequest::CallTool { name, arguments } => {
            to_value(conn.call_tool(ctx, name, arguments).await?)
        }
        ClientRequest::ListResources { cursor } => {
            to_value(conn.list_resources(ctx, cursor).await?)
        }
        ClientRequest::ListResourceTemplates { cursor } => {
            to_value(conn.list_resource_templates(ctx, cursor).await?)
        }
        ClientRequest::ReadResource { uri } => to_value(conn.read_resource(ctx, uri).await?),
    }
}

fn to_value<T: serde::Serialize>(result: T) -> Result<Value> {
    serde_json::to_value(result).map_err(Into::into)
}

/// Handle a notification using the connection
async fn handle_notification(
    connection: &dyn ServerConn,
    notification: JSONRPCNotification,
    context: &ServerCtx,
) -> Result<()> {
    debug!("Received notification: {}", notification.method);

    let mut object = match notification.params {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    object.remove("_meta");
    object.insert("method".to_string(), Value::String(notification.method.clone()));

    match serde_json::from_value::<ClientNotification>(Value::Object(object)) {
        Ok(typed) => connection.notification(context, typed).await,
        Err(e) => {
            warn!("Ignoring unknown client notification {}: {}", notification.method, e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClientCapabilities, Implementation, InitializeResult, RequestId, METHOD_NOT_FOUND, INVALID_PARAMS};
    use async_trait::async_trait;
    use serde_json::json;

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

    fn ctx() -> ServerCtx {
        let (tx, _) = broadcast::channel(1);
        ServerCtx::new(tx)
    }

    async fn request(method: &str, params: Option<Value>) -> JSONRPCMessage {
        let req = JSONRPCRequest::new(RequestId::Number(1), method, params);
        handle_message(&Echo, JSONRPCMessage::Request(req), &ctx())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let params = json!({"protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "t", "version": "1"}});
        match request("initialize", Some(params)).await {
            JSONRPCMessage::Response(resp) => assert_eq!(resp.result["protocolVersion"], "2024-11-05"),
            other => panic!("unexpected {other:?}"),
        }
        match request("ping", None).await {
            JSONRPCMessage::Response(resp) => assert_eq!(resp.result, json!({})),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        match request("prompts/list", None).await {
            JSONRPCMessage::Error(err) => assert_eq!(err.error.code, METHOD_NOT_FOUND),
            other => panic!("unexpected {other:?}"),
        }
        match request("tools/call", Some(json!({"name": "missing"}))).await {
            JSONRPCMessage::Error(err) => {
                assert_eq!(err.error.code, INVALID_PARAMS);
                assert_eq!(err.error.message, "Tool missing not found");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notifications_produce_no_reply() {
        let notification = JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(handle_message(&Echo, JSONRPCMessage::Notification(notification), &ctx())
            .await
            .is_none());
    }
}
