//! Subprocess tool servers.
//!
//! Servers are configured with [`ToolServerConfig`], started by a
//! [`ToolServerLauncher`] (child processes speaking newline-delimited
//! JSON-RPC by default) and tracked by the [`ToolManager`].

mod config;
mod connection;
mod manager;
pub mod protocol;
mod stdio;

pub use config::{load_server_configs, parse_server_configs, ToolServerConfig};
pub use connection::{ToolConnection, ToolServerLauncher};
pub use manager::{DiscoverySummary, ToolCallOutcome, ToolInfo, ToolManager, ToolState};
pub use protocol::{CallToolResult, ContentBlock, ToolDescriptor};
pub use stdio::{StdioLauncher, StdioToolConnection};
