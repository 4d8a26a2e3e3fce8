use serde::{Deserialize, Serialize};

use super::{ClientCapabilities, Implementation, RequestId};
use crate::arguments::Arguments;

/// An opaque token used to represent a cursor for pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Cursor(pub String);

/// Requests sent from the client to the server.
///
/// Decoded from an object holding the request's `method` alongside its
/// params, see [`ClientRequest::from_parts`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum ClientRequest {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "initialize")]
    Initialize {
        #[serde(rename = "protocolVersion")]
        protocol_version: String,
        #[serde(default)]
        capabilities: ClientCapabilities,
        #[serde(rename = "clientInfo")]
        client_info: Implementation,
    },
    #[serde(rename = "tools/list")]
    ListTools {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
    #[serde(rename = "tools/call")]
    CallTool {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<Arguments>,
    },
    #[serde(rename = "resources/list")]
    ListResources {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
    #[serde(rename = "resources/templates/list")]
    ListResourceTemplates {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
    #[serde(rename = "resources/read")]
    ReadResource { uri: String },
}

/// Methods this server answers; anything else is "method not found".
const KNOWN_METHODS: &[&str] = &[
    "ping",
    "initialize",
    "tools/list",
    "tools/call",
    "resources/list",
    "resources/templates/list",
    "resources/read",
];

/// Why a request could not be decoded.
#[derive(Debug)]
pub enum RequestDecodeError {
    UnknownMethod(String),
    InvalidParams(String),
}

impl ClientRequest {
    /// Merge a method name and its params object into a typed request.
    pub fn from_parts(
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Self, RequestDecodeError> {
        if !KNOWN_METHODS.contains(&method) {
            return Err(RequestDecodeError::UnknownMethod(method.to_string()));
        }
        let mut object = match params {
            Some(serde_json::Value::Object(map)) => map,
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(_) => {
                return Err(RequestDecodeError::InvalidParams(
                    "params must be an object".to_string(),
                ))
            }
        };
        object.remove("_meta");
        object.insert(
            "method".to_string(),
            serde_json::Value::String(method.to_string()),
        );
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| RequestDecodeError::InvalidParams(e.to_string()))
    }
}

/// Notifications sent from the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum ClientNotification {
    #[serde(rename = "notifications/initialized")]
    Initialized,
    #[serde(rename = "notifications/cancelled")]
    Cancelled {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "notifications/progress")]
    Progress {
        #[serde(rename = "progressToken")]
        progress_token: serde_json::Value,
        progress: f64,
    },
    #[serde(rename = "notifications/roots/list_changed")]
    RootsListChanged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_tool_from_parts() {
        let req = ClientRequest::from_parts(
            "tools/call",
            Some(json!({"name": "manage_campaigns", "arguments": {"action": "list"}, "_meta": {"progressToken": 1}})),
        )
        .unwrap();
        match req {
            ClientRequest::CallTool { name, arguments } => {
                assert_eq!(name, "manage_campaigns");
                assert_eq!(arguments.unwrap().get_str("action"), Some("list"));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_unknown_method_and_bad_params() {
        assert!(matches!(
            ClientRequest::from_parts("prompts/list", None),
            Err(RequestDecodeError::UnknownMethod(m)) if m == "prompts/list"
        ));
        assert!(matches!(
            ClientRequest::from_parts("resources/read", Some(json!({}))),
            Err(RequestDecodeError::InvalidParams(_))
        ));
        assert!(matches!(
            ClientRequest::from_parts("ping", None),
            Ok(ClientRequest::Ping)
        ));
    }
}
