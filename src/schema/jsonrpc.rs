use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ClientRequest;

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];
pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Implementation-defined server errors used by the HTTP transport
pub const BAD_REQUEST: i32 = -32000;
pub const SESSION_NOT_FOUND: i32 = -32001;

/// Any JSON-RPC object that can be decoded off the wire or encoded to be
/// sent. Batches are handled by the transports as `Vec<JSONRPCMessage>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

impl JSONRPCMessage {
    /// True for requests, the only messages that expect an answer.
    pub fn is_request(&self) -> bool {
        matches!(self, JSONRPCMessage::Request(_))
    }

    pub fn is_initialize(&self) -> bool {
        matches!(self, JSONRPCMessage::Request(req) if req.method == "initialize")
    }
}

/// A uniquely identifying ID for a request in JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

/// A request that expects a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JSONRPCRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A notification which does not expect a response.
///
/// Unknown fields are rejected so that a request with an unusable `id` is
/// not mistaken for a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A successful (non-error) response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

/// A response to a request that indicates an error occurred.
///
/// The id is `null` when the failing request could not be identified, for
/// example on a parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: ErrorObject,
}

impl JSONRPCError {
    pub fn new(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: ErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error type that occurred.
    pub code: i32,
    /// A short description of the error.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Check whether a raw body is a single, well-formed `initialize` request
/// whose params decode the way the server will decode them.
pub fn is_initialize_request(body: &Value) -> bool {
    body.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
        && body.get("method").and_then(Value::as_str) == Some("initialize")
        && body.get("id").is_some_and(|id| id.is_string() || id.is_i64())
        && body
            .get("params")
            .filter(|params| params.is_object())
            .is_some_and(|params| ClientRequest::from_parts("initialize", Some(params.clone())).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_message_decoding() {
        let msg: JSONRPCMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(msg.is_request());

        let msg: JSONRPCMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .unwrap();
        assert!(matches!(msg, JSONRPCMessage::Notification(_)));

        let msg: JSONRPCMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": "a", "error": {"code": -32601, "message": "nope"}}),
        )
        .unwrap();
        assert!(matches!(msg, JSONRPCMessage::Error(_)));
    }

    #[test]
    fn test_request_with_unusable_id_is_not_a_notification() {
        for id in [json!(null), json!(1.5), json!(u64::MAX), json!({"n": 1})] {
            let result = serde_json::from_value::<JSONRPCMessage>(
                json!({"jsonrpc": "2.0", "id": id, "method": "tools/list"}),
            );
            assert!(result.is_err(), "id {id} decoded as {result:?}");
        }
    }

    #[test]
    fn test_parse_error_serializes_null_id() {
        let err = JSONRPCError::new(None, PARSE_ERROR, "Parse error");
        let value = serde_json::to_value(err).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
    }

    #[test]
    fn test_initialize_detection() {
        let init = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": {"name": "t", "version": "1"}}
        });
        assert!(is_initialize_request(&init));
        assert!(!is_initialize_request(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})));
        assert!(!is_initialize_request(&json!([init])));
        assert!(!is_initialize_request(&json!({"jsonrpc": "2.0", "method": "initialize", "params": {}})));
        assert!(!is_initialize_request(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})));
        assert!(!is_initialize_request(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2025-06-18", "capabilities": {}}
        })));
    }
}
