//! The remote entry point: streamable HTTP at `/mcp` behind bearer
//! authentication, plus the OAuth bridge and a health check.

use std::{panic::AssertUnwindSafe, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::FutureExt;
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    auth::{self, require_bearer, AuthInfo, BearerAuth, JwksVerifier, KeycloakProvider, OAuthServerProvider, TokenVerifier},
    client::ApiClient,
    config::{ApiConfig, RemoteConfig},
    context::with_bearer_token,
    error::Result,
    http::{error_response, SessionRegistry, SessionTransport, SESSION_ID_HEADER},
    schema::{is_initialize_request, BAD_REQUEST, INTERNAL_ERROR},
    server::Server,
    service,
};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    server: Server,
    sessions: SessionRegistry,
}

/// Build the remote application.
///
/// `verifier` guards `/mcp`; `provider` backs the OAuth endpoints. Every
/// route checks the `Host` header against `config.allowed_hosts`.
pub fn router(
    server: Server,
    sessions: SessionRegistry,
    provider: Arc<dyn OAuthServerProvider>,
    verifier: Arc<dyn TokenVerifier>,
    config: &RemoteConfig,
) -> Result<Router> {
    let issuer = config.issuer()?;
    let resource = config.resource_url()?;
    let bearer = BearerAuth::new(verifier, auth::protected_resource_metadata_url(&resource));

    let mcp = Router::new()
        .route("/mcp", post(handle_post).get(handle_get).delete(handle_delete))
        .route_layer(middleware::from_fn_with_state(bearer, require_bearer))
        .with_state(AppState { server, sessions });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Ok(Router::new()
        .route("/health", get(health))
        .merge(auth::router(provider, issuer, resource))
        .merge(mcp)
        .layer(middleware::from_fn_with_state(
            Arc::new(config.allowed_hosts.clone()),
            validate_host,
        ))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
}

/// Serve until SIGINT or SIGTERM, then close every session.
pub async fn serve(api: ApiConfig, config: RemoteConfig) -> Result<()> {
    let client = ApiClient::new(&api)?;
    let server = service::server(client);
    let sessions = SessionRegistry::new();

    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwksVerifier::new(&config.realm_url));
    let provider = Arc::new(KeycloakProvider::new(
        &config.realm_url,
        &config.client_id,
        verifier.clone(),
    ));
    let app = router(server, sessions.clone(), provider, verifier, &config)?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("MCP remote server listening on port {}", config.port);
    info!("Issuer: {}", config.issuer_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;
    info!("MCP remote server stopped");
    Ok(())
}

async fn shutdown_signal(sessions: SessionRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    sessions.close_all();
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn handle_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let work = with_bearer_token(auth.token, dispatch_post(&state, &headers, &body));
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            error!("MCP request error: request handler panicked");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR,
                "Internal server error",
            )
        }
    }
}

async fn dispatch_post(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    let session_id = session_id(headers);

    if let Some(transport) = session_id.and_then(|id| state.sessions.get(id)) {
        return transport.handle_post(headers, body).await;
    }

    let initializing = session_id.is_none()
        && serde_json::from_slice::<Value>(body).is_ok_and(|value| is_initialize_request(&value));
    if !initializing {
        warn!(session_id = ?session_id, "Rejecting request without a valid session");
        return error_response(
            StatusCode::BAD_REQUEST,
            BAD_REQUEST,
            "Bad Request: No valid session ID",
        );
    }

    let transport = Arc::new(
        SessionTransport::new(state.server.new_connection())
            .with_on_close(state.sessions.removal_callback()),
    );
    let response = transport.handle_post(headers, body).await;
    match transport.session_id() {
        Some(id) if response.status().is_success() => {
            state.sessions.insert(id, transport.clone());
            debug!(session_id = %id, sessions = state.sessions.len(), "Session registered");
        }
        _ => debug!(status = response.status().as_u16(), "Initialize did not open a session"),
    }
    response
}

async fn handle_get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    headers: HeaderMap,
) -> Response {
    match session_id(&headers).and_then(|id| state.sessions.get(id)) {
        Some(transport) => with_bearer_token(auth.token, transport.handle_get(&headers)).await,
        None => invalid_session(),
    }
}

async fn handle_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    headers: HeaderMap,
) -> Response {
    match session_id(&headers).and_then(|id| state.sessions.get(id)) {
        Some(transport) => with_bearer_token(auth.token, transport.handle_delete(&headers)).await,
        None => invalid_session(),
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok())
}

fn invalid_session() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid or missing session ID").into_response()
}

/// DNS rebinding protection: the `Host` (port stripped) must be allowed.
async fn validate_host(State(allowed): State<Arc<Vec<String>>>, request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()));
    let Some(host) = host else {
        warn!("Rejecting request without Host header");
        return error_response(StatusCode::FORBIDDEN, BAD_REQUEST, "Missing Host header");
    };

    let hostname = Url::parse(&format!("http://{host}"))
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| host.to_string());
    if !allowed.iter().any(|h| *h == hostname) {
        warn!(host = %hostname, "Rejecting request for unexpected host");
        return error_response(
            StatusCode::FORBIDDEN,
            BAD_REQUEST,
            &format!("Invalid Host: {hostname}"),
        );
    }
    next.run(request).await
}
