use async_trait::async_trait;

use crate::{
    arguments::Arguments,
    context::ServerCtx,
    error::{Error, Result},
    schema::{
        CallToolResult, ClientCapabilities, ClientNotification, Cursor, Implementation,
        InitializeResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
        ReadResourceResult,
    },
};

/// Connection trait that servers implement.
///
/// Every session gets its own instance from the server's connection
/// factory. Methods take `&self` so requests of one session can be handled
/// concurrently; use interior mutability for any mutable state.
#[async_trait]
pub trait ServerConn: Send + Sync {
    /// Handle the initialize request
    async fn initialize(
        &self,
        context: &ServerCtx,
        protocol_version: String,
        capabilities: ClientCapabilities,
        client_info: Implementation,
    ) -> Result<InitializeResult>;

    /// Respond to a ping request from the client
    async fn pong(&self, _context: &ServerCtx) -> Result<()> {
        Ok(())
    }

    async fn list_tools(
        &self,
        _context: &ServerCtx,
        _cursor: Option<Cursor>,
    ) -> Result<ListToolsResult> {
        Ok(ListToolsResult::default())
    }

    async fn call_tool(
        &self,
        _context: &ServerCtx,
        name: String,
        _arguments: Option<Arguments>,
    ) -> Result<CallToolResult> {
        Err(Error::ToolNotFound(name))
    }

    async fn list_resources(
        &self,
        _context: &ServerCtx,
        _cursor: Option<Cursor>,
    ) -> Result<ListResourcesResult> {
        Ok(ListResourcesResult::default())
    }

    async fn list_resource_templates(
        &self,
        _context: &ServerCtx,
        _cursor: Option<Cursor>,
    ) -> Result<ListResourceTemplatesResult> {
        Ok(ListResourceTemplatesResult::default())
    }

    async fn read_resource(&self, _context: &ServerCtx, uri: String) -> Result<ReadResourceResult> {
        Err(Error::ResourceNotFound(uri))
    }

    /// Handle a notification from the client
    async fn notification(
        &self,
        _context: &ServerCtx,
        _notification: ClientNotification,
    ) -> Result<()> {
        Ok(())
    }
}
