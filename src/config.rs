//! Process configuration, read from the environment by the command line
//! layer and validated here before anything starts serving.

use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://app.messengerflow.com/api/v1";
pub const DEFAULT_REALM_URL: &str = "https://auth.messengerflow.com/realms/messengerflow";
pub const DEFAULT_CLIENT_ID: &str = "messengerflow-mcp";
pub const DEFAULT_PORT: u16 = 3003;
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["mcp.messengerflow.com", "localhost", "127.0.0.1"];

/// Every MessengerFlow API key carries this prefix.
pub const API_KEY_PREFIX: &str = "mf_";

/// Settings for the outbound MessengerFlow REST client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(Error::InvalidConfiguration(
                "MESSENGERFLOW_API_KEY environment variable is required".into(),
            ));
        }
        if !self.api_key.starts_with(API_KEY_PREFIX) {
            return Err(Error::InvalidConfiguration(format!(
                "MESSENGERFLOW_API_KEY must start with \"{API_KEY_PREFIX}\""
            )));
        }
        Url::parse(&self.base_url).map_err(|e| {
            Error::InvalidConfiguration(format!("MESSENGERFLOW_BASE_URL is not a valid URL: {e}"))
        })?;
        Ok(())
    }
}

/// Settings for the remote (HTTP) entry point.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub port: u16,
    pub issuer_url: String,
    pub realm_url: String,
    pub client_id: String,
    pub allowed_hosts: Vec<String>,
}

impl RemoteConfig {
    pub fn new(port: u16, issuer_url: Option<String>) -> Self {
        Self {
            port,
            issuer_url: issuer_url.unwrap_or_else(|| default_issuer_url(port)),
            realm_url: DEFAULT_REALM_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn with_realm_url(mut self, realm_url: impl Into<String>) -> Self {
        self.realm_url = realm_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts;
        self
    }

    /// The parsed issuer URL, checked the way OAuth metadata requires.
    pub fn issuer(&self) -> Result<Url> {
        let issuer = Url::parse(&self.issuer_url).map_err(|e| {
            Error::InvalidConfiguration(format!("MCP_ISSUER_URL is not a valid URL: {e}"))
        })?;
        let local = matches!(issuer.host_str(), Some("localhost") | Some("127.0.0.1"));
        if issuer.scheme() != "https" && !local {
            return Err(Error::InvalidConfiguration(
                "Issuer URL must be HTTPS".into(),
            ));
        }
        if issuer.fragment().is_some() {
            return Err(Error::InvalidConfiguration(format!(
                "Issuer URL must not have a fragment: {issuer}"
            )));
        }
        if issuer.query().is_some() {
            return Err(Error::InvalidConfiguration(format!(
                "Issuer URL must not have a query string: {issuer}"
            )));
        }
        Ok(issuer)
    }

    /// URL of the protected MCP endpoint, `/mcp` under the issuer.
    pub fn resource_url(&self) -> Result<Url> {
        self.issuer()?
            .join("/mcp")
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid resource URL: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.issuer()?;
        Url::parse(&self.realm_url).map_err(|e| {
            Error::InvalidConfiguration(format!("KEYCLOAK_REALM_URL is not a valid URL: {e}"))
        })?;
        if self.client_id.is_empty() {
            return Err(Error::InvalidConfiguration(
                "KEYCLOAK_CLIENT_ID must not be empty".into(),
            ));
        }
        Ok(())
    }
}

pub fn default_issuer_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Split a comma separated host list, dropping blanks.
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}
