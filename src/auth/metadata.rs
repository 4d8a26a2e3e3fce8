use serde::{Deserialize, Serialize};
use url::Url;

/// Path of the authorization server metadata document (RFC 8414).
pub const AUTHORIZATION_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// Prefix of the protected resource metadata document (RFC 9728); the
/// resource path is appended.
pub const PROTECTED_RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    pub fn for_issuer(issuer: &Url) -> Self {
        let endpoint = |path: &str| issuer.join(path).map(String::from).unwrap_or_default();
        Self {
            issuer: issuer.as_str().to_string(),
            authorization_endpoint: endpoint("/authorize"),
            token_endpoint: endpoint("/token"),
            registration_endpoint: endpoint("/register"),
            response_types_supported: vec!["code".into()],
            code_challenge_methods_supported: vec!["S256".into()],
            token_endpoint_auth_methods_supported: vec!["client_secret_post".into()],
            grant_types_supported: vec!["authorization_code".into(), "refresh_token".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
}

impl ProtectedResourceMetadata {
    pub fn new(resource: &Url, issuer: &Url) -> Self {
        Self {
            resource: resource.as_str().to_string(),
            authorization_servers: vec![issuer.as_str().to_string()],
        }
    }
}

/// Where clients find the metadata of `resource`: the well-known prefix
/// followed by the resource path, on the resource's origin.
pub fn protected_resource_metadata_url(resource: &Url) -> String {
    let path = resource.path().trim_end_matches('/');
    format!(
        "{}{PROTECTED_RESOURCE_METADATA_PATH}{path}",
        resource.origin().ascii_serialization()
    )
}
