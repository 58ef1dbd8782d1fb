//! In-memory tool servers.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ToolError;
use crate::tools::protocol::{CallToolResult, ContentBlock, ToolDescriptor};
use crate::tools::{ToolConnection, ToolServerConfig, ToolServerLauncher};

/// A tool server whose tools answer with fixed text.
#[derive(Debug)]
pub struct FakeConnection {
    server: String,
    tools: Vec<(ToolDescriptor, String)>,
    error_tools: Vec<String>,
    list_failure: Option<String>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    disconnects: AtomicUsize,
    closed: AtomicBool,
}

impl FakeConnection {
    /// Creates a server with no tools.
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tools: Vec::new(),
            error_tools: Vec::new(),
            list_failure: None,
            calls: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Adds a tool replying with `reply`.
    #[must_use]
    pub fn with_tool(mut self, tool: ToolDescriptor, reply: impl Into<String>) -> Self {
        self.tools.push((tool, reply.into()));
        self
    }

    /// Adds a tool that reports `isError` with `reply`.
    #[must_use]
    pub fn with_error_tool(mut self, tool: ToolDescriptor, reply: impl Into<String>) -> Self {
        self.error_tools.push(tool.name.clone());
        self.with_tool(tool, reply)
    }

    /// Makes `tools/list` fail with a protocol error.
    #[must_use]
    pub fn with_list_failure(mut self, message: impl Into<String>) -> Self {
        self.list_failure = Some(message.into());
        self
    }

    /// Returns every call received as (tool, arguments).
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().clone()
    }

    /// Returns how often `disconnect` was called.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolConnection for FakeConnection {
    fn server_name(&self) -> &str {
        &self.server
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        if let Some(message) = &self.list_failure {
            return Err(ToolError::protocol(&self.server, message));
        }
        Ok(self.tools.iter().map(|(tool, _)| tool.clone()).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ToolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolError::ConnectionClosed {
                server: self.server.clone(),
            });
        }
        self.calls.lock().push((name.to_string(), arguments));
        let (_, reply) = self
            .tools
            .iter()
            .find(|(tool, _)| tool.name == name)
            .ok_or_else(|| ToolError::NotFound {
                server: self.server.clone(),
                tool: name.to_string(),
            })?;
        Ok(CallToolResult {
            content: vec![ContentBlock::text(reply.as_str())],
            is_error: Some(self.error_tools.iter().any(|t| t == name)),
        })
    }

    async fn disconnect(&self) -> Result<(), ToolError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum FakeServer {
    Up(Arc<FakeConnection>),
    Down(String),
}

/// Launcher handing out [`FakeConnection`]s by server name.
///
/// Unknown names fail to launch.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    servers: HashMap<String, FakeServer>,
}

impl FakeLauncher {
    /// Creates a launcher with no servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server.
    #[must_use]
    pub fn with_server(self, connection: FakeConnection) -> Self {
        self.with_shared_server(Arc::new(connection))
    }

    /// Registers a server the caller keeps a handle to.
    #[must_use]
    pub fn with_shared_server(mut self, connection: Arc<FakeConnection>) -> Self {
        self.servers
            .insert(connection.server.clone(), FakeServer::Up(connection));
        self
    }

    /// Makes launching `server` fail.
    #[must_use]
    pub fn with_failure(mut self, server: impl Into<String>, message: impl Into<String>) -> Self {
        self.servers
            .insert(server.into(), FakeServer::Down(message.into()));
        self
    }
}

#[async_trait]
impl ToolServerLauncher for FakeLauncher {
    async fn connect(&self, config: &ToolServerConfig) -> Result<Arc<dyn ToolConnection>, ToolError> {
        match self.servers.get(&config.name) {
            Some(FakeServer::Up(connection)) => {
                let connection: Arc<dyn ToolConnection> = connection.clone();
                Ok(connection)
            }
            Some(FakeServer::Down(message)) => Err(ToolError::launch(&config.name, message)),
            None => Err(ToolError::launch(&config.name, "unknown server")),
        }
    }
}
