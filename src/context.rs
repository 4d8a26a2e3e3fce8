//! Per-request context: the [`ServerCtx`] handed to every connection method
//! and the ambient bearer token of the HTTP request being served.
//!
//! The token lives in a tokio task-local. It is bound for the duration of a
//! future with [`with_bearer_token`] and read anywhere inside it with
//! [`bearer_token`]. Tasks spawned with plain `tokio::spawn` start without a
//! token; use [`spawn_with_bearer_token`] to carry it over.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{
    error::{Error, Result},
    schema::{JSONRPCNotification, RequestId, JSONRPC_VERSION},
};

tokio::task_local! {
    static BEARER_TOKEN: String;
}

/// Run `fut` with `token` bound as the current bearer token.
pub async fn with_bearer_token<F>(token: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    BEARER_TOKEN.scope(token.into(), fut).await
}

/// The token bound by the innermost enclosing [`with_bearer_token`], if any.
pub fn bearer_token() -> Option<String> {
    BEARER_TOKEN.try_with(|token| token.clone()).ok()
}

/// Spawn `fut` on the runtime, bound to the caller's bearer token.
pub fn spawn_with_bearer_token<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match bearer_token() {
        Some(token) => tokio::spawn(BEARER_TOKEN.scope(token, fut)),
        None => tokio::spawn(fut),
    }
}

/// Context provided to [`ServerConn`](crate::ServerConn) implementations.
///
/// Cheap to clone; one instance is created per connection and narrowed per
/// request with [`ServerCtx::with_request_id`].
#[derive(Debug, Clone)]
pub struct ServerCtx {
    /// Sender for server-initiated notifications
    pub(crate) notification_tx: broadcast::Sender<JSONRPCNotification>,
    session_id: Option<String>,
    request_id: Option<RequestId>,
}

impl ServerCtx {
    pub(crate) fn new(notification_tx: broadcast::Sender<JSONRPCNotification>) -> Self {
        Self {
            notification_tx,
            session_id: None,
            request_id: None,
        }
    }

    pub(crate) fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub(crate) fn with_request_id(&self, request_id: RequestId) -> Self {
        let mut ctx = self.clone();
        ctx.request_id = Some(request_id);
        ctx
    }

    /// Session this request belongs to. `None` on stdio and while a session
    /// is still being initialized.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// The caller's bearer token, when the request came in over HTTP.
    pub fn bearer_token(&self) -> Option<String> {
        bearer_token()
    }

    /// Send a notification to the client on the connection's outbound stream.
    pub fn notify(&self, method: impl Into<String>, params: Option<serde_json::Value>) -> Result<()> {
        self.notification_tx
            .send(JSONRPCNotification {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method: method.into(),
                params,
            })
            .map_err(|_| Error::InternalError("Failed to send notification".into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_unset_outside_scope() {
        assert_eq!(bearer_token(), None);
        let seen = with_bearer_token("abc", async { bearer_token() }).await;
        assert_eq!(seen.as_deref(), Some("abc"));
        assert_eq!(bearer_token(), None);
    }

    #[tokio::test]
    async fn test_innermost_scope_wins() {
        let seen = with_bearer_token("outer", async {
            let inner = with_bearer_token("inner", async { bearer_token() }).await;
            (inner, bearer_token())
        })
        .await;
        assert_eq!(seen.0.as_deref(), Some("inner"));
        assert_eq!(seen.1.as_deref(), Some("outer"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_requests_are_isolated() {
        let mut handles = Vec::new();
        for i in 0..32 {
            handles.push(tokio::spawn(with_bearer_token(format!("token-{i}"), async move {
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    assert_eq!(bearer_token(), Some(format!("token-{i}")));
                }
                i
            })));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_spawned_work_inherits_token() {
        let inherited = with_bearer_token("t-1", async {
            spawn_with_bearer_token(async { bearer_token() }).await.unwrap()
        })
        .await;
        assert_eq!(inherited.as_deref(), Some("t-1"));

        let plain = with_bearer_token("t-2", async { tokio::spawn(async { bearer_token() }).await.unwrap() }).await;
        assert_eq!(plain, None);

        let unbound = spawn_with_bearer_token(async { bearer_token() }).await.unwrap();
        assert_eq!(unbound, None);
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        let ctx = ServerCtx::new(tx).with_session_id("s-1");
        assert_eq!(ctx.session_id(), Some("s-1"));

        ctx.notify("notifications/message", Some(serde_json::json!({"level": "info"})))
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.method, "notifications/message");
    }
}
