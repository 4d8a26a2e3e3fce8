use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::OAuthError;

/// How long an issued client secret stays valid.
pub const CLIENT_SECRET_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Client metadata submitted to the registration endpoint (RFC 7591).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthClientMetadata {
    /// Redirection URIs for the authorization code flow. Required.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Authentication method for the token endpoint; `none` marks a public
    /// client that gets no secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,

    /// Human-readable name of the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    /// Space-separated scope values the client can use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    /// Additional metadata fields, kept as sent
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl OAuthClientMetadata {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uris: vec![redirect_uri.into()],
            ..Default::default()
        }
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_token_endpoint_auth_method(mut self, method: impl Into<String>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method.as_deref() == Some("none")
    }

    pub fn validate(&self) -> Result<(), OAuthError> {
        if self.redirect_uris.is_empty() {
            return Err(OAuthError::InvalidClientMetadata(
                "redirect_uris is required".into(),
            ));
        }
        for uri in &self.redirect_uris {
            Url::parse(uri).map_err(|e| {
                OAuthError::InvalidClientMetadata(format!("Invalid redirect URI {uri}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// A registered client: the issued credentials plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthClientInformation {
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Seconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<u64>,

    /// Seconds since epoch; 0 means the secret never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<u64>,

    #[serde(flatten)]
    pub metadata: OAuthClientMetadata,
}

impl OAuthClientInformation {
    /// Issue fresh credentials for `metadata`: a UUID client id and, unless
    /// the client is public, a random secret expiring after
    /// [`CLIENT_SECRET_LIFETIME`].
    pub fn issue(metadata: OAuthClientMetadata) -> Self {
        let issued_at = unix_now();
        let public = metadata.is_public();
        Self {
            client_id: Uuid::new_v4().to_string(),
            client_secret: (!public).then(generate_client_secret),
            client_id_issued_at: Some(issued_at),
            client_secret_expires_at: (!public)
                .then(|| issued_at + CLIENT_SECRET_LIFETIME.as_secs()),
            metadata,
        }
    }

    /// Resolve the redirect URI of an authorization request. It must be one
    /// of the registered URIs, and may be omitted only when exactly one is
    /// registered.
    pub fn resolve_redirect_uri(&self, requested: Option<&str>) -> Result<String, OAuthError> {
        match requested {
            Some(uri) if self.metadata.redirect_uris.iter().any(|r| r == uri) => Ok(uri.to_string()),
            Some(_) => Err(OAuthError::InvalidRequest("Unregistered redirect_uri".into())),
            None => match self.metadata.redirect_uris.as_slice() {
                [only] => Ok(only.clone()),
                _ => Err(OAuthError::InvalidRequest(
                    "redirect_uri must be specified when client has multiple registered URIs"
                        .into(),
                )),
            },
        }
    }

    /// Check the secret presented at the token endpoint.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<(), OAuthError> {
        let Some(secret) = &self.client_secret else {
            return Ok(());
        };
        let presented =
            presented.ok_or_else(|| OAuthError::InvalidClient("Client secret is required".into()))?;
        if presented != secret {
            return Err(OAuthError::InvalidClient("Invalid client_secret".into()));
        }
        if let Some(expires_at) = self.client_secret_expires_at {
            if expires_at != 0 && expires_at < unix_now() {
                return Err(OAuthError::InvalidClient(
                    "Client secret has expired".into(),
                ));
            }
        }
        Ok(())
    }
}

/// In-memory store of dynamically registered clients.
#[derive(Debug, Default)]
pub struct ClientStore {
    clients: DashMap<String, OAuthClientInformation>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_client(&self, client_id: &str) -> Option<OAuthClientInformation> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    /// Store `client` under its id. A later registration with the same id
    /// replaces the earlier one.
    pub fn register_client(&self, client: OAuthClientInformation) -> OAuthClientInformation {
        self.clients.insert(client.client_id.clone(), client.clone());
        client
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn generate_client_secret() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_roundtrip_keeps_unknown_fields() {
        let metadata: OAuthClientMetadata = serde_json::from_value(json!({
            "redirect_uris": ["http://localhost:8080/callback"],
            "client_name": "Inspector",
            "jwks_uri": "https://client.example.com/jwks"
        }))
        .unwrap();
        assert!(metadata.validate().is_ok());
        assert_eq!(metadata.client_name.as_deref(), Some("Inspector"));
        assert!(metadata.additional.contains_key("jwks_uri"));
    }

    #[test]
    fn test_metadata_validation() {
        let err = OAuthClientMetadata::default().validate().unwrap_err();
        assert_eq!(err.code(), "invalid_client_metadata");

        let err = OAuthClientMetadata::new("not a url").validate().unwrap_err();
        assert!(err.to_string().contains("Invalid redirect URI"));
    }

    #[test]
    fn test_issue_confidential_and_public() {
        let confidential = OAuthClientInformation::issue(OAuthClientMetadata::new("http://localhost/cb"));
        let secret = confidential.client_secret.clone().unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(&secret).unwrap().len(), 32);
        let issued = confidential.client_id_issued_at.unwrap();
        assert_eq!(
            confidential.client_secret_expires_at,
            Some(issued + CLIENT_SECRET_LIFETIME.as_secs())
        );
        assert!(Uuid::parse_str(&confidential.client_id).is_ok());

        let public = OAuthClientInformation::issue(
            OAuthClientMetadata::new("http://localhost/cb").with_token_endpoint_auth_method("none"),
        );
        assert_eq!(public.client_secret, None);
        assert_eq!(public.client_secret_expires_at, None);
    }

    #[test]
    fn test_redirect_uri_resolution() {
        let mut client = OAuthClientInformation::issue(OAuthClientMetadata::new("http://a/cb"));
        assert_eq!(client.resolve_redirect_uri(None).unwrap(), "http://a/cb");
        assert_eq!(client.resolve_redirect_uri(Some("http://a/cb")).unwrap(), "http://a/cb");
        assert!(client.resolve_redirect_uri(Some("http://evil/cb")).is_err());

        client.metadata.redirect_uris.push("http://b/cb".into());
        assert!(client.resolve_redirect_uri(None).is_err());
    }

    #[test]
    fn test_client_authentication() {
        let mut client = OAuthClientInformation::issue(OAuthClientMetadata::new("http://a/cb"));
        let secret = client.client_secret.clone().unwrap();
        assert!(client.authenticate(Some(&secret)).is_ok());
        assert!(client.authenticate(None).is_err());
        assert!(client.authenticate(Some("wrong")).is_err());

        client.client_secret_expires_at = Some(1);
        let err = client.authenticate(Some(&secret)).unwrap_err();
        assert_eq!(err.to_string(), "Client secret has expired");
    }

    #[test]
    fn test_register_is_last_write_wins() {
        let store = ClientStore::new();
        let first = OAuthClientInformation::issue(OAuthClientMetadata::new("http://a/cb"));
        let mut second = OAuthClientInformation::issue(OAuthClientMetadata::new("http://b/cb"));
        second.client_id = first.client_id.clone();

        store.register_client(first.clone());
        let returned = store.register_client(second.clone());
        assert_eq!(returned, second);
        assert_eq!(store.get_client(&first.client_id), Some(second));
        assert_eq!(store.len(), 1);
    }
}
