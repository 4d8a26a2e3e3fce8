//! Outbound client for the MessengerFlow REST API.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

const API_KEY_HEADER: &str = "X-Api-Key";
const DEFAULT_RETRY_AFTER: &str = "60";

/// A failed call to the MessengerFlow API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The API answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid JSON in response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of the upstream failure, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }
}

/// Options for a single API call. Defaults to a bare `GET`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("messengerflow-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Issue one request against `{base_url}{path}`.
    ///
    /// An empty success body yields an empty JSON object.
    pub async fn call(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> std::result::Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %options.method, path, "calling MessengerFlow API");

        let mut request = self
            .http
            .request(options.method.clone(), &url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, "application/json");

        if !options.params.is_empty() {
            request = request.query(&options.params);
        }
        if let Some(body) = &options.body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let err = failure_from_response(response).await;
            warn!(method = %options.method, path, status = status.as_u16(), "MessengerFlow API call failed");
            return Err(err);
        }

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

async fn failure_from_response(response: Response) -> ApiError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => ApiError::status(401, "API key is invalid or revoked"),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_RETRY_AFTER)
                .to_string();
            ApiError::status(429, format!("Rate limited. Retry after {retry_after}s"))
        }
        _ => {
            let code = status.as_u16();
            let mut message = format!("Request failed ({code})");
            if let Ok(data) = response.json::<Value>().await {
                if let Some(text) = error_text(&data) {
                    message = text;
                }
            }
            if status == StatusCode::FORBIDDEN {
                message = format!("Access denied: {message}");
            }
            ApiError::status(code, message)
        }
    }
}

/// The `error` field of an error body, falling back to `message`.
fn error_text(data: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
