//! Discovery and invocation of tools across many servers.

use super::config::ToolServerConfig;
use super::connection::{ToolConnection, ToolServerLauncher};
use super::protocol::ToolDescriptor;
use super::stdio::StdioLauncher;
use crate::errors::ToolError;
use crate::events::{noop_sink, EventSink};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Registry key: a server and, for connected entries, one of its tools.
///
/// A server that failed discovery is keyed with `tool: None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolInfo {
    /// Server name from its config.
    pub server_name: String,
    /// The tool, absent for a failed server.
    pub tool: Option<ToolDescriptor>,
}

impl ToolInfo {
    /// Creates a key for a discovered tool.
    pub fn new(server_name: impl Into<String>, tool: ToolDescriptor) -> Self {
        Self {
            server_name: server_name.into(),
            tool: Some(tool),
        }
    }

    /// Creates the key a failed server is recorded under.
    pub fn server_only(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            tool: None,
        }
    }

    /// Returns the tool name, if any.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_ref().map(|t| t.name.as_str())
    }
}

/// What the registry knows about a key.
#[derive(Debug, Clone)]
pub enum ToolState {
    /// Callable through this connection.
    Connected(Arc<dyn ToolConnection>),
    /// Discovery failed with this error.
    Errored(ToolError),
}

impl ToolState {
    /// Returns true for connected entries.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Output of a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallOutcome {
    /// Content blocks rendered to text and joined by newlines.
    pub content: String,
    /// Whether the tool reported failure.
    pub is_error: bool,
}

/// Counts from one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Servers that started and listed their tools.
    pub connected_servers: usize,
    /// Servers recorded as errored.
    pub failed_servers: usize,
    /// Tools registered in total.
    pub tool_count: usize,
}

type Registry = HashMap<ToolInfo, ToolState>;

/// Starts configured tool servers, keeps a registry of their tools and
/// routes calls to the right connection.
///
/// The registry is written only by [`ToolManager::load_available_tools`],
/// which replaces it wholesale.
pub struct ToolManager {
    configs: Vec<ToolServerConfig>,
    launcher: Arc<dyn ToolServerLauncher>,
    registry: RwLock<Registry>,
    events: Arc<dyn EventSink>,
}

impl ToolManager {
    /// Creates a manager launching servers as child processes.
    #[must_use]
    pub fn new(configs: Vec<ToolServerConfig>) -> Self {
        Self {
            configs,
            launcher: Arc::new(StdioLauncher),
            registry: RwLock::new(HashMap::new()),
            events: noop_sink(),
        }
    }

    /// Replaces the launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ToolServerLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the server configs.
    #[must_use]
    pub fn configs(&self) -> &[ToolServerConfig] {
        &self.configs
    }

    /// Starts every configured server concurrently and rebuilds the
    /// registry from their tool lists.
    ///
    /// A server that fails to start, handshake or list is recorded as one
    /// errored entry; the others are unaffected.
    pub async fn load_available_tools(&self) -> DiscoverySummary {
        let handles = self.configs.iter().map(|config| {
            let launcher = Arc::clone(&self.launcher);
            let config = config.clone();
            tokio::spawn(async move { discover(launcher.as_ref(), &config).await })
        });
        let results = join_all(handles.collect::<Vec<_>>()).await;

        let mut registry = Registry::new();
        let mut summary = DiscoverySummary::default();
        for (config, result) in self.configs.iter().zip(results) {
            let outcome = result.unwrap_or_else(|join_err| {
                Err(ToolError::launch(
                    &config.name,
                    format!("discovery task failed: {join_err}"),
                ))
            });
            match outcome {
                Ok((connection, tools)) => {
                    summary.connected_servers += 1;
                    summary.tool_count += tools.len();
                    for tool in tools {
                        registry.insert(
                            ToolInfo::new(&config.name, tool),
                            ToolState::Connected(Arc::clone(&connection)),
                        );
                    }
                }
                Err(err) => {
                    warn!(server = %config.name, error = %err, "tool server discovery failed");
                    summary.failed_servers += 1;
                    registry.insert(ToolInfo::server_only(&config.name), ToolState::Errored(err));
                }
            }
        }

        *self.registry.write().await = registry;
        info!(
            connected = summary.connected_servers,
            failed = summary.failed_servers,
            tools = summary.tool_count,
            "tool discovery finished"
        );
        self.events.try_emit(
            "tools.discovered",
            Some(json!({
                "connected_servers": summary.connected_servers,
                "failed_servers": summary.failed_servers,
                "tool_count": summary.tool_count,
            })),
        );
        summary
    }

    /// Returns every registry key.
    pub async fn available_tools(&self) -> Vec<ToolInfo> {
        self.registry.read().await.keys().cloned().collect()
    }

    /// Returns the state recorded for `tool`.
    pub async fn state_of(&self, tool: &ToolInfo) -> Option<ToolState> {
        self.registry.read().await.get(tool).cloned()
    }

    /// Finds a connected tool by server and tool name.
    pub async fn find_tool(&self, server_name: &str, tool_name: &str) -> Option<ToolInfo> {
        self.registry
            .read()
            .await
            .keys()
            .find(|info| info.server_name == server_name && info.tool_name() == Some(tool_name))
            .cloned()
    }

    /// Lists connected tools as text, one per line, sorted by server and
    /// tool name.
    pub async fn describe_tools(&self) -> String {
        let registry = self.registry.read().await;
        let mut tools: Vec<(&str, &ToolDescriptor)> = registry
            .iter()
            .filter(|(_, state)| state.is_connected())
            .filter_map(|(info, _)| info.tool.as_ref().map(|t| (info.server_name.as_str(), t)))
            .collect();
        tools.sort_by(|a, b| (a.0, &a.1.name).cmp(&(b.0, &b.1.name)));

        let mut out = String::new();
        for (server, tool) in tools {
            let _ = write!(out, "- server: {server}, tool: {}", tool.name);
            if let Some(description) = &tool.description {
                let _ = write!(out, ", description: {description}");
            }
            let _ = writeln!(out, ", arguments schema: {}", tool.input_schema);
        }
        out
    }

    /// Calls a tool.
    ///
    /// An errored server yields [`ToolError::Unavailable`], a key without a
    /// tool name [`ToolError::MissingToolName`], and a key not in the
    /// registry `Ok(None)`.
    pub async fn call(
        &self,
        tool: &ToolInfo,
        arguments: Map<String, Value>,
    ) -> Result<Option<ToolCallOutcome>, ToolError> {
        // Clone out so the lock is not held across the call.
        let state = self.state_of(tool).await;
        if let Some(ToolState::Errored(err)) = &state {
            return Err(ToolError::Unavailable {
                server: tool.server_name.clone(),
                reason: err.to_string(),
            });
        }
        let Some(name) = tool.tool_name() else {
            return Err(ToolError::MissingToolName {
                server: tool.server_name.clone(),
            });
        };
        let Some(ToolState::Connected(connection)) = state else {
            debug!(server = %tool.server_name, tool = name, "tool not registered");
            return Ok(None);
        };

        debug!(server = %tool.server_name, tool = name, "calling tool");
        let result = connection.call_tool(name, arguments).await?;
        let outcome = ToolCallOutcome {
            content: result.content_text(),
            is_error: result.is_error.unwrap_or(false),
        };
        self.events.try_emit(
            "tools.called",
            Some(json!({
                "server": tool.server_name,
                "tool": name,
                "is_error": outcome.is_error,
            })),
        );
        Ok(Some(outcome))
    }

    /// Disconnects every connected server once. The registry is kept.
    pub async fn unload(&self) {
        let mut connections: Vec<Arc<dyn ToolConnection>> = Vec::new();
        for state in self.registry.read().await.values() {
            if let ToolState::Connected(connection) = state {
                if !connections.iter().any(|c| Arc::ptr_eq(c, connection)) {
                    connections.push(Arc::clone(connection));
                }
            }
        }

        for connection in connections {
            if let Err(err) = connection.disconnect().await {
                warn!(server = connection.server_name(), error = %err, "disconnect failed");
            }
        }
        self.events.try_emit("tools.unloaded", None);
    }
}

impl fmt::Debug for ToolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolManager")
            .field(
                "servers",
                &self.configs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

async fn discover(
    launcher: &dyn ToolServerLauncher,
    config: &ToolServerConfig,
) -> Result<(Arc<dyn ToolConnection>, Vec<ToolDescriptor>), ToolError> {
    let connection = launcher.connect(config).await?;
    match connection.list_tools().await {
        Ok(tools) => {
            debug!(server = %config.name, tools = tools.len(), "server connected");
            Ok((connection, tools))
        }
        Err(err) => {
            let _ = connection.disconnect().await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::testing::{FakeConnection, FakeLauncher};
    use pretty_assertions::assert_eq;

    fn configs() -> Vec<ToolServerConfig> {
        vec![
            ToolServerConfig::new("math", "/bin/math"),
            ToolServerConfig::new("text", "/bin/text"),
            ToolServerConfig::new("broken", "/bin/broken"),
        ]
    }

    fn launcher() -> FakeLauncher {
        FakeLauncher::new()
            .with_server(
                FakeConnection::new("math")
                    .with_tool(ToolDescriptor::new("add"), "3")
                    .with_tool(ToolDescriptor::new("mul"), "2"),
            )
            .with_server(FakeConnection::new("text").with_tool(ToolDescriptor::new("upper"), "HI"))
            .with_failure("broken", "no such file")
    }

    #[tokio::test]
    async fn test_discovery_isolates_failures() {
        let sink = Arc::new(CollectingEventSink::new());
        let manager = ToolManager::new(configs())
            .with_launcher(Arc::new(launcher()))
            .with_event_sink(sink.clone());

        let summary = manager.load_available_tools().await;

        assert_eq!(
            summary,
            DiscoverySummary {
                connected_servers: 2,
                failed_servers: 1,
                tool_count: 3,
            }
        );
        let tools = manager.available_tools().await;
        assert_eq!(tools.len(), 4);
        let errored: Vec<_> = tools.iter().filter(|t| t.tool.is_none()).collect();
        assert_eq!(errored, vec![&ToolInfo::server_only("broken")]);
        assert!(matches!(
            manager.state_of(errored[0]).await,
            Some(ToolState::Errored(ToolError::Launch { .. }))
        ));
        assert_eq!(sink.event_types(), vec!["tools.discovered"]);
    }

    #[tokio::test]
    async fn test_call_routes_to_connection() {
        let manager = ToolManager::new(configs()).with_launcher(Arc::new(launcher()));
        manager.load_available_tools().await;

        let add = manager.find_tool("math", "add").await.unwrap();
        let outcome = manager.call(&add, Map::new()).await.unwrap();

        assert_eq!(
            outcome,
            Some(ToolCallOutcome {
                content: "3".into(),
                is_error: false,
            })
        );
    }

    #[tokio::test]
    async fn test_absent_tool_is_no_result() {
        let manager = ToolManager::new(configs()).with_launcher(Arc::new(launcher()));
        manager.load_available_tools().await;

        let ghost = ToolInfo::new("math", ToolDescriptor::new("sqrt"));
        assert_eq!(manager.call(&ghost, Map::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_errored_server_is_unavailable() {
        let manager = ToolManager::new(configs()).with_launcher(Arc::new(launcher()));
        manager.load_available_tools().await;

        let err = manager
            .call(&ToolInfo::server_only("broken"), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Unavailable { ref server, .. } if server == "broken"));
    }

    #[tokio::test]
    async fn test_key_without_tool_name_is_rejected() {
        let manager = ToolManager::new(configs()).with_launcher(Arc::new(launcher()));
        manager.load_available_tools().await;

        let err = manager
            .call(&ToolInfo::server_only("math"), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::MissingToolName { ref server } if server == "math"));
    }

    #[tokio::test]
    async fn test_reload_replaces_registry() {
        let manager = ToolManager::new(vec![ToolServerConfig::new("math", "/bin/math")])
            .with_launcher(Arc::new(launcher()));
        manager.load_available_tools().await;
        assert_eq!(manager.available_tools().await.len(), 2);

        let manager = manager.with_launcher(Arc::new(
            FakeLauncher::new().with_failure("math", "crashed"),
        ));
        manager.load_available_tools().await;

        assert_eq!(
            manager.available_tools().await,
            vec![ToolInfo::server_only("math")]
        );
    }

    #[tokio::test]
    async fn test_unload_disconnects_each_server_once() {
        let math = Arc::new(
            FakeConnection::new("math")
                .with_tool(ToolDescriptor::new("add"), "3")
                .with_tool(ToolDescriptor::new("mul"), "2"),
        );
        let manager = ToolManager::new(vec![ToolServerConfig::new("math", "/bin/math")])
            .with_launcher(Arc::new(FakeLauncher::new().with_shared_server(math.clone())));
        manager.load_available_tools().await;

        manager.unload().await;

        assert_eq!(math.disconnect_count(), 1);
        assert_eq!(manager.available_tools().await.len(), 2);
    }

    #[tokio::test]
    async fn test_describe_tools_lists_connected_only() {
        let manager = ToolManager::new(configs()).with_launcher(Arc::new(launcher()));
        manager.load_available_tools().await;

        let text = manager.describe_tools().await;

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("- server: math, tool: add"));
        assert!(lines[2].starts_with("- server: text, tool: upper"));
        assert!(!text.contains("broken"));
    }
}
