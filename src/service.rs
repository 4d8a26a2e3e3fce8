//! The MessengerFlow MCP connection: tools and resources backed by the
//! REST API.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    arguments::Arguments,
    client::ApiClient,
    config::ApiConfig,
    connection::ServerConn,
    context::ServerCtx,
    error::{Error, Result},
    resources,
    schema::{
        CallToolResult, ClientCapabilities, ClientNotification, Cursor, Implementation,
        InitializeResult, ListResourcesResult, ListToolsResult, ReadResourceResult,
    },
    server::Server,
    tools,
};

pub const SERVER_NAME: &str = "MessengerFlow";
pub const SERVER_VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct MessengerFlowServer {
    client: ApiClient,
}

impl MessengerFlowServer {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

/// A server handing every session its own connection over a shared client.
pub fn server(client: ApiClient) -> Server {
    Server::with_connection(move || MessengerFlowServer::new(client.clone()))
}

/// The local entry point: one session over stdin/stdout, trusted by virtue
/// of the API key.
pub async fn serve_stdio(api: &ApiConfig) -> Result<()> {
    let client = ApiClient::new(api)?;
    info!("MessengerFlow MCP server running on stdio");
    server(client).serve_stdio().await
}

#[async_trait]
impl ServerConn for MessengerFlowServer {
    async fn initialize(
        &self,
        context: &ServerCtx,
        protocol_version: String,
        _capabilities: ClientCapabilities,
        client_info: Implementation,
    ) -> Result<InitializeResult> {
        info!(
            client = %client_info.name,
            session_id = context.session_id().unwrap_or("-"),
            "Initializing MessengerFlow session"
        );
        Ok(InitializeResult::new(SERVER_NAME, SERVER_VERSION)
            .with_negotiated_version(&protocol_version)
            .with_tools(false)
            .with_resources(false, false))
    }

    async fn list_tools(
        &self,
        _context: &ServerCtx,
        _cursor: Option<Cursor>,
    ) -> Result<ListToolsResult> {
        Ok(ListToolsResult::default().with_tools(tools::TOOLS.iter().map(|tool| tool.to_tool())))
    }

    async fn call_tool(
        &self,
        context: &ServerCtx,
        name: String,
        arguments: Option<Arguments>,
    ) -> Result<CallToolResult> {
        let tool = tools::find(&name).ok_or(Error::ToolNotFound(name))?;
        debug!(
            tool = tool.name,
            session_id = context.session_id().unwrap_or("-"),
            authenticated = context.bearer_token().is_some(),
            "Calling tool"
        );
        Ok(tools::dispatch(&self.client, tool, arguments).await)
    }

    async fn list_resources(
        &self,
        _context: &ServerCtx,
        _cursor: Option<Cursor>,
    ) -> Result<ListResourcesResult> {
        Ok(ListResourcesResult {
            resources: vec![resources::dashboard()],
            next_cursor: None,
        })
    }

    async fn read_resource(&self, _context: &ServerCtx, uri: String) -> Result<ReadResourceResult> {
        match uri.as_str() {
            resources::DASHBOARD_URI => resources::read_dashboard(&self.client).await,
            _ => Err(Error::ResourceNotFound(uri)),
        }
    }

    async fn notification(&self, context: &ServerCtx, notification: ClientNotification) -> Result<()> {
        if let ClientNotification::Initialized = notification {
            debug!(session_id = context.session_id().unwrap_or("-"), "Client initialized");
        }
        Ok(())
    }
}
