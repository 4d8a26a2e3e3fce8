use thiserror::Error;

use crate::client::ApiError;
use crate::schema::{
    ErrorObject, JSONRPCError, RequestId, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    JSONRPC_VERSION, METHOD_NOT_FOUND,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The identity provider answered a token request with a failure status.
    #[error("Token {action} failed ({status}): {body}")]
    TokenExchange {
        action: &'static str,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Resource {0} not found")]
    ResourceNotFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// JSON-RPC error object for errors that carry a protocol-level code.
    ///
    /// Returns `None` for everything that should surface as a generic
    /// internal error.
    pub fn to_jsonrpc_response(&self, id: RequestId) -> Option<JSONRPCError> {
        let code = match self {
            Error::MethodNotFound(_) => METHOD_NOT_FOUND,
            Error::InvalidParams(_) | Error::ToolNotFound(_) | Error::ResourceNotFound(_) => {
                INVALID_PARAMS
            }
            Error::InvalidRequest(_) => INVALID_REQUEST,
            _ => return None,
        };
        Some(JSONRPCError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            error: ErrorObject {
                code,
                message: self.to_string(),
                data: None,
            },
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_keep_their_codes() {
        let err = Error::MethodNotFound("bogus/method".into());
        let resp = err.to_jsonrpc_response(RequestId::Number(7)).unwrap();
        assert_eq!(resp.error.code, METHOD_NOT_FOUND);
        assert_eq!(resp.id, Some(RequestId::Number(7)));

        let err = Error::ToolNotFound("nope".into());
        let resp = err.to_jsonrpc_response(RequestId::Number(1)).unwrap();
        assert_eq!(resp.error.code, INVALID_PARAMS);
        assert_eq!(resp.error.message, "Tool nope not found");
    }

    #[test]
    fn test_other_errors_have_no_specific_response() {
        let err = Error::InternalError("boom".into());
        assert!(err.to_jsonrpc_response(RequestId::Number(1)).is_none());

        let err = Error::TokenExchange {
            action: "exchange",
            status: 400,
            body: "invalid_grant".into(),
        };
        assert_eq!(err.to_string(), "Token exchange failed (400): invalid_grant");

        let err = Error::TokenExchange {
            action: "refresh",
            status: 401,
            body: "expired".into(),
        };
        assert_eq!(err.to_string(), "Token refresh failed (401): expired");
    }
}
