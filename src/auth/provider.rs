use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{
    clients::{ClientStore, OAuthClientInformation},
    verifier::{AuthInfo, TokenVerifier},
};
use crate::error::{Error, Result};

/// Scopes forwarded to Keycloak; anything else a client asks for is dropped.
pub const ALLOWED_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Token response of the upstream token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// A validated authorization request, ready to be sent upstream.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationParams {
    pub redirect_uri: String,
    pub code_challenge: String,
    pub state: Option<String>,
    pub scopes: Vec<String>,
    pub resource: Option<Url>,
}

/// The capabilities the auth router needs from an authorization backend.
#[async_trait]
pub trait OAuthServerProvider: TokenVerifier {
    fn clients_store(&self) -> &ClientStore;

    /// URL the user agent is redirected to in order to log in.
    fn authorize(&self, client: &OAuthClientInformation, params: &AuthorizationParams) -> Result<Url>;

    /// The PKCE challenge recorded for `code`.
    async fn challenge_for_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
    ) -> Result<String>;

    async fn exchange_authorization_code(
        &self,
        client: &OAuthClientInformation,
        code: &str,
        code_verifier: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<OAuthTokens>;

    async fn exchange_refresh_token(
        &self,
        client: &OAuthClientInformation,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<OAuthTokens>;

    /// When true, the router passes the code verifier through instead of
    /// checking it against [`Self::challenge_for_authorization_code`].
    fn skip_local_pkce_validation(&self) -> bool {
        false
    }
}

/// Bridges the router onto a Keycloak realm. Login, PKCE enforcement and
/// token issuance all happen upstream under one pre-configured Keycloak
/// client id.
pub struct KeycloakProvider {
    http: reqwest::Client,
    realm_url: String,
    client_id: String,
    clients: ClientStore,
    verifier: Arc<dyn TokenVerifier>,
}

impl KeycloakProvider {
    pub fn new(
        realm_url: impl Into<String>,
        client_id: impl Into<String>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            realm_url: realm_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            clients: ClientStore::new(),
            verifier,
        }
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.realm_url)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url)
    }

    async fn request_tokens(&self, action: &'static str, form: &[(&str, &str)]) -> Result<OAuthTokens> {
        debug!(action, "Requesting tokens from Keycloak");
        let response = self.http.post(self.token_endpoint()).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(action, status = status.as_u16(), "Upstream token request failed");
            return Err(Error::TokenExchange {
                action,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<OAuthTokens>().await?)
    }
}

#[async_trait]
impl TokenVerifier for KeycloakProvider {
    async fn verify_access_token(&self, token: &str) -> Result<AuthInfo> {
        self.verifier.verify_access_token(token).await
    }
}

#[async_trait]
impl OAuthServerProvider for KeycloakProvider {
    fn clients_store(&self) -> &ClientStore {
        &self.clients
    }

    fn authorize(&self, _client: &OAuthClientInformation, params: &AuthorizationParams) -> Result<Url> {
        let mut url = Url::parse(&self.authorization_endpoint())
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid realm URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &params.redirect_uri)
                .append_pair("code_challenge", &params.code_challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(state) = &params.state {
                query.append_pair("state", state);
            }
            let scopes = filter_scopes(&params.scopes);
            if !scopes.is_empty() {
                query.append_pair("scope", &scopes.join(" "));
            }
        }
        Ok(url)
    }

    async fn challenge_for_authorization_code(
        &self,
        _client: &OAuthClientInformation,
        _code: &str,
    ) -> Result<String> {
        Ok(String::new())
    }

    async fn exchange_authorization_code(
        &self,
        _client: &OAuthClientInformation,
        code: &str,
        code_verifier: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<OAuthTokens> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }
        if let Some(uri) = redirect_uri {
            form.push(("redirect_uri", uri));
        }
        self.request_tokens("exchange", &form).await
    }

    async fn exchange_refresh_token(
        &self,
        _client: &OAuthClientInformation,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<OAuthTokens> {
        let scope = scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        self.request_tokens("refresh", &form).await
    }

    fn skip_local_pkce_validation(&self) -> bool {
        true
    }
}

/// Requested scopes that are on [`ALLOWED_SCOPES`], in request order.
pub fn filter_scopes(requested: &[String]) -> Vec<&str> {
    requested
        .iter()
        .map(String::as_str)
        .filter(|scope| ALLOWED_SCOPES.contains(scope))
        .collect()
}
