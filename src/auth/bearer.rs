use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::{
    clients::unix_now,
    verifier::{AuthInfo, TokenVerifier},
    OAuthError,
};
use crate::error::Error;

/// State of the [`require_bearer`] middleware.
#[derive(Clone)]
pub struct BearerAuth {
    verifier: Arc<dyn TokenVerifier>,
    resource_metadata_url: String,
}

impl BearerAuth {
    pub fn new(verifier: Arc<dyn TokenVerifier>, resource_metadata_url: impl Into<String>) -> Self {
        Self {
            verifier,
            resource_metadata_url: resource_metadata_url.into(),
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthInfo, OAuthError> {
        let token = extract_bearer(headers)?;
        let info = self
            .verifier
            .verify_access_token(token)
            .await
            .map_err(|e| match e {
                Error::Authentication(message) => OAuthError::InvalidToken(message),
                other => {
                    error!("Token verification failed: {}", other);
                    OAuthError::ServerError("Internal Server Error".into())
                }
            })?;

        match info.expires_at {
            None => Err(OAuthError::InvalidToken("Token has no expiration time".into())),
            Some(exp) if exp < unix_now() => Err(OAuthError::InvalidToken("Token has expired".into())),
            Some(_) => Ok(info),
        }
    }

    fn reject(&self, err: OAuthError) -> Response {
        let challenge = match &err {
            OAuthError::InvalidToken(description) => Some(format!(
                "Bearer error=\"invalid_token\", error_description=\"{}\", resource_metadata=\"{}\"",
                description.replace('"', "'"),
                self.resource_metadata_url
            )),
            _ => None,
        };
        let mut response = err.into_response();
        if let Some(hv) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, hv);
        }
        response
    }
}

/// Reject requests without a valid bearer token; on success the verified
/// [`AuthInfo`] is attached to the request extensions.
pub async fn require_bearer(State(auth): State<BearerAuth>, mut request: Request, next: Next) -> Response {
    match auth.authenticate(request.headers()).await {
        Ok(info) => {
            debug!(client_id = %info.client_id, "Bearer token accepted");
            request.extensions_mut().insert(info);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = e.code(), "Bearer authentication failed: {}", e);
            auth.reject(e)
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, OAuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| OAuthError::InvalidToken("Missing Authorization header".into()))?
        .to_str()
        .map_err(|_| invalid_format())?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(invalid_format()),
    }
}

fn invalid_format() -> OAuthError {
    OAuthError::InvalidToken("Invalid Authorization header format, expected 'Bearer TOKEN'".into())
}
