use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    clients::{OAuthClientInformation, OAuthClientMetadata},
    metadata::{
        AuthorizationServerMetadata, ProtectedResourceMetadata, AUTHORIZATION_SERVER_METADATA_PATH,
        PROTECTED_RESOURCE_METADATA_PATH,
    },
    provider::{AuthorizationParams, OAuthServerProvider, OAuthTokens},
    OAuthError,
};

#[derive(Clone)]
struct AuthState {
    provider: Arc<dyn OAuthServerProvider>,
    issuer: Url,
    resource: Url,
}

/// The authorization server surface: discovery documents, `/register`,
/// `/authorize` and `/token`, all backed by `provider`.
pub fn router(provider: Arc<dyn OAuthServerProvider>, issuer: Url, resource: Url) -> Router {
    let resource_metadata_path = format!(
        "{PROTECTED_RESOURCE_METADATA_PATH}{}",
        resource.path().trim_end_matches('/')
    );
    let state = AuthState {
        provider,
        issuer,
        resource,
    };

    Router::new()
        .route(AUTHORIZATION_SERVER_METADATA_PATH, get(server_metadata))
        .route(&resource_metadata_path, get(resource_metadata))
        .route("/register", post(register))
        .route("/authorize", get(authorize_query).post(authorize_form))
        .route("/token", post(token))
        .with_state(state)
}

async fn server_metadata(State(state): State<AuthState>) -> Json<AuthorizationServerMetadata> {
    Json(AuthorizationServerMetadata::for_issuer(&state.issuer))
}

async fn resource_metadata(State(state): State<AuthState>) -> Json<ProtectedResourceMetadata> {
    Json(ProtectedResourceMetadata::new(&state.resource, &state.issuer))
}

async fn register(State(state): State<AuthState>, body: Bytes) -> Response {
    let metadata = match serde_json::from_slice::<OAuthClientMetadata>(&body) {
        Ok(metadata) => metadata,
        Err(e) => return OAuthError::InvalidClientMetadata(format!("Invalid client metadata: {e}")).into_response(),
    };
    if let Err(e) = metadata.validate() {
        return e.into_response();
    }

    let client = state
        .provider
        .clients_store()
        .register_client(OAuthClientInformation::issue(metadata));
    info!(client_id = %client.client_id, name = ?client.metadata.client_name, "Registered OAuth client");
    no_store((StatusCode::CREATED, Json(client)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizeRequest {
    client_id: Option<String>,
    redirect_uri: Option<String>,
    response_type: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    resource: Option<String>,
}

async fn authorize_query(
    State(state): State<AuthState>,
    request: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    match request {
        Ok(Query(request)) => authorize(&state, request),
        Err(e) => OAuthError::InvalidRequest(e.body_text()).into_response(),
    }
}

async fn authorize_form(
    State(state): State<AuthState>,
    request: Result<Form<AuthorizeRequest>, FormRejection>,
) -> Response {
    match request {
        Ok(Form(request)) => authorize(&state, request),
        Err(e) => OAuthError::InvalidRequest(e.body_text()).into_response(),
    }
}

/// Client and redirect URI problems are answered directly. Everything after
/// that goes back to the client through the verified redirect URI.
fn authorize(state: &AuthState, request: AuthorizeRequest) -> Response {
    let Some(client_id) = request.client_id.as_deref() else {
        return OAuthError::InvalidRequest("client_id is required".into()).into_response();
    };
    let Some(client) = state.provider.clients_store().get_client(client_id) else {
        return OAuthError::InvalidClient("Invalid client_id".into()).into_response();
    };
    let redirect_uri = match client.resolve_redirect_uri(request.redirect_uri.as_deref()) {
        Ok(uri) => uri,
        Err(e) => return e.into_response(),
    };

    let result = authorization_params(&request, redirect_uri.clone())
        .and_then(|params| {
            state.provider.authorize(&client, &params).map_err(|e| {
                warn!(client_id, "Authorization redirect failed: {}", e);
                OAuthError::ServerError("Internal Server Error".into())
            })
        });

    match result {
        Ok(location) => {
            debug!(client_id, "Redirecting to identity provider");
            redirect(location.as_str())
        }
        Err(e) => match error_redirect(&redirect_uri, &e, request.state.as_deref()) {
            Some(location) => redirect(location.as_str()),
            None => e.into_response(),
        },
    }
}

fn authorization_params(request: &AuthorizeRequest, redirect_uri: String) -> Result<AuthorizationParams, OAuthError> {
    if request.response_type.as_deref() != Some("code") {
        return Err(OAuthError::InvalidRequest("response_type must be \"code\"".into()));
    }
    let code_challenge = request
        .code_challenge
        .clone()
        .ok_or_else(|| OAuthError::InvalidRequest("code_challenge is required".into()))?;
    if request.code_challenge_method.as_deref() != Some("S256") {
        return Err(OAuthError::InvalidRequest("code_challenge_method must be \"S256\"".into()));
    }
    let resource = request
        .resource
        .as_deref()
        .map(Url::parse)
        .transpose()
        .map_err(|e| OAuthError::InvalidRequest(format!("Invalid resource: {e}")))?;

    Ok(AuthorizationParams {
        redirect_uri,
        code_challenge,
        state: request.state.clone(),
        scopes: request
            .scope
            .as_deref()
            .map(|s| s.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
        resource,
    })
}

fn error_redirect(redirect_uri: &str, err: &OAuthError, state: Option<&str>) -> Option<Url> {
    let mut url = Url::parse(redirect_uri).ok()?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("error", err.code())
            .append_pair("error_description", &err.description());
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Some(url)
}

#[derive(Debug, Default, Deserialize)]
struct TokenRequest {
    grant_type: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    code: Option<String>,
    code_verifier: Option<String>,
    redirect_uri: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

async fn token(State(state): State<AuthState>, request: Result<Form<TokenRequest>, FormRejection>) -> Response {
    let result = match request {
        Ok(Form(request)) => exchange(&state, request).await,
        Err(e) => Err(OAuthError::InvalidRequest(e.body_text())),
    };
    match result {
        Ok(tokens) => no_store(Json(tokens).into_response()),
        Err(e) => e.into_response(),
    }
}

async fn exchange(state: &AuthState, request: TokenRequest) -> Result<OAuthTokens, OAuthError> {
    let client = authenticate_client(state, &request)?;
    let provider = &state.provider;

    let grant_type = request
        .grant_type
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("grant_type is required".into()))?;

    let tokens = match grant_type {
        "authorization_code" => {
            let code = required(&request.code, "code")?;
            let code_verifier = required(&request.code_verifier, "code_verifier")?;

            let skip_pkce = provider.skip_local_pkce_validation();
            if !skip_pkce {
                let challenge = provider
                    .challenge_for_authorization_code(&client, code)
                    .await
                    .map_err(upstream_failure)?;
                if !verify_pkce(code_verifier, &challenge) {
                    return Err(OAuthError::InvalidGrant(
                        "code_verifier does not match the challenge".into(),
                    ));
                }
            }

            provider
                .exchange_authorization_code(
                    &client,
                    code,
                    skip_pkce.then_some(code_verifier),
                    request.redirect_uri.as_deref(),
                )
                .await
        }
        "refresh_token" => {
            let refresh_token = required(&request.refresh_token, "refresh_token")?;
            let scopes: Vec<String> = request
                .scope
                .as_deref()
                .map(|s| s.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            provider.exchange_refresh_token(&client, refresh_token, &scopes).await
        }
        _ => {
            return Err(OAuthError::UnsupportedGrantType(
                "The grant type is not supported by this authorization server.".into(),
            ))
        }
    }
    .map_err(upstream_failure)?;

    info!(client_id = %client.client_id, grant_type, "Issued tokens");
    Ok(tokens)
}

fn authenticate_client(state: &AuthState, request: &TokenRequest) -> Result<OAuthClientInformation, OAuthError> {
    let client_id = required(&request.client_id, "client_id")?;
    let client = state
        .provider
        .clients_store()
        .get_client(client_id)
        .ok_or_else(|| OAuthError::InvalidClient("Invalid client_id".into()))?;
    client.authenticate(request.client_secret.as_deref())?;
    Ok(client)
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

/// Upstream detail stays in the log.
fn upstream_failure(err: crate::error::Error) -> OAuthError {
    warn!("Token request failed: {}", err);
    OAuthError::ServerError("Internal Server Error".into())
}

/// RFC 7636 S256: the challenge is the unpadded base64url SHA-256 of the
/// verifier.
fn verify_pkce(verifier: &str, challenge: &str) -> bool {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())) == challenge
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => no_store((StatusCode::FOUND, [(header::LOCATION, location)]).into_response()),
        Err(_) => OAuthError::ServerError("Invalid redirect location".into()).into_response(),
    }
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
