//! # messengerflow-mcp
//!
//! A Model Context Protocol server exposing the MessengerFlow CRM API as
//! tools and resources.
//!
//! ## Transports
//!
//! - **Stdio**: a single local session, authenticated by the configured API
//!   key. See [`service::serve_stdio`].
//! - **Remote**: multi-session streamable HTTP at `/mcp`, guarded by bearer
//!   tokens issued through an OAuth bridge to Keycloak. See [`remote::serve`].
//!
//! In remote mode the caller's bearer token travels with each request as
//! ambient context ([`bearer_token`]), readable from any tool handler. Calls
//! to the MessengerFlow API always authenticate with the server's own API
//! key; the bearer token is never sent upstream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use messengerflow_mcp::{config::ApiConfig, service, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let api = ApiConfig::new("mf_live_key", "https://app.messengerflow.com/api/v1");
//!     api.validate()?;
//!     service::serve_stdio(&api).await
//! }
//! ```

mod codec;
mod connection;
mod context;
mod error;
mod server;

pub mod arguments;
pub mod auth;
pub mod client;
pub mod config;
pub mod http;
pub mod remote;
pub mod resources;
pub mod schema;
pub mod service;
pub mod tools;

pub use arguments::Arguments;
pub use client::{ApiClient, ApiError};
pub use connection::ServerConn;
pub use context::{bearer_token, spawn_with_bearer_token, with_bearer_token, ServerCtx};
pub use error::{Error, Result};
pub use http::{SessionRegistry, SessionTransport};
pub use server::Server;
pub use service::MessengerFlowServer;

#[cfg(test)]
mod tests {
    use super::schema::*;

    #[test]
    fn test_jsonrpc_request_serialization() {
        let request = JSONRPCRequest::new(RequestId::Number(1), "tools/list", None);

        let json = serde_json::to_string(&request).unwrap();
        let parsed: JSONRPCRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.jsonrpc, JSONRPC_VERSION);
        assert_eq!(parsed.id, RequestId::Number(1));
        assert_eq!(parsed.method, "tools/list");
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_string_request_id() {
        let parsed: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed, RequestId::String("abc".into()));
    }
}
