//! Seams between the tool manager and a running tool server.

use super::config::ToolServerConfig;
use super::protocol::{CallToolResult, ToolDescriptor};
use crate::errors::ToolError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::Arc;

/// An open session with one tool server.
#[async_trait]
pub trait ToolConnection: Send + Sync + Debug {
    /// Returns the configured server name.
    fn server_name(&self) -> &str;

    /// Lists every tool the server offers.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;

    /// Invokes a tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ToolError>;

    /// Closes the session. Further calls fail with
    /// [`ToolError::ConnectionClosed`].
    async fn disconnect(&self) -> Result<(), ToolError>;
}

/// Starts tool servers.
#[async_trait]
pub trait ToolServerLauncher: Send + Sync + Debug {
    /// Starts the server and completes the protocol handshake.
    async fn connect(&self, config: &ToolServerConfig) -> Result<Arc<dyn ToolConnection>, ToolError>;
}
