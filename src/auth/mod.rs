//! # OAuth bridge for the remote transport
//!
//! The remote server acts as an OAuth 2.0 authorization server towards MCP
//! clients while delegating the actual login and token issuance to an
//! upstream Keycloak realm.
//!
//! - [`router`] serves discovery metadata, dynamic client registration
//!   (RFC 7591), `/authorize` and `/token`.
//! - [`KeycloakProvider`] translates those endpoints onto the realm's
//!   `openid-connect` endpoints.
//! - [`JwksVerifier`] checks access tokens against the realm's published
//!   key set, and [`require_bearer`] guards the MCP endpoint with it.
//!
//! Registered clients live in memory only and are lost on restart.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

mod bearer;
mod clients;
mod metadata;
mod provider;
mod router;
mod verifier;

pub use bearer::{require_bearer, BearerAuth};
pub use clients::{ClientStore, OAuthClientInformation, OAuthClientMetadata};
pub use metadata::{
    protected_resource_metadata_url, AuthorizationServerMetadata, ProtectedResourceMetadata,
};
pub use provider::{AuthorizationParams, KeycloakProvider, OAuthServerProvider, OAuthTokens};
pub use router::router;
pub use verifier::{AuthInfo, JwksVerifier, TokenVerifier};

/// Error answered by the OAuth endpoints, serialized as
/// `{error, error_description}`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidClient(String),

    #[error("{0}")]
    InvalidClientMetadata(String),

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidScope(String),

    #[error("{0}")]
    UnsupportedGrantType(String),

    #[error("{0}")]
    UnsupportedResponseType(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    ServerError(String),
}

#[derive(Serialize)]
struct OAuthErrorBody<'a> {
    error: &'static str,
    error_description: &'a str,
}

impl OAuthError {
    /// The RFC 6749 error code.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidClientMetadata(_) => "invalid_client_metadata",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        let body = OAuthErrorBody {
            error: self.code(),
            error_description: &description,
        };
        let mut response = (self.status(), Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_statuses() {
        let err = OAuthError::InvalidClientMetadata("redirect_uris is required".into());
        assert_eq!(err.code(), "invalid_client_metadata");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.description(), "redirect_uris is required");

        assert_eq!(
            OAuthError::ServerError("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OAuthError::InvalidToken("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
