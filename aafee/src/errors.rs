//! Error types for aafee.
//!
//! Every concern gets its own enum; [`FlowError`] wraps them all so a flow
//! can propagate any stage failure with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for flow and stage execution.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A value could not be coerced.
    #[error("{0}")]
    Value(#[from] StageValueError),

    /// An agent stage failed.
    #[error("{0}")]
    Agent(#[from] AgentError),

    /// Configuration was rejected.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A file stage failed.
    #[error("{0}")]
    File(#[from] FileStageError),

    /// The HTTP tool-server stage failed.
    #[error("{0}")]
    McpServer(#[from] McpServerError),

    /// A subprocess tool failed.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// A looped flow hit its iteration cap without being told to stop.
    #[error("flow '{flow}' exceeded {limit} iterations")]
    MaxIterationsExceeded {
        /// Flow name.
        flow: String,
        /// Configured cap.
        limit: usize,
    },

    /// A user-defined stage failed.
    #[error("stage '{stage}' failed: {message}")]
    Stage {
        /// Stage name.
        stage: String,
        /// Failure description.
        message: String,
    },
}

impl FlowError {
    /// Creates a generic stage failure.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Errors from [`crate::core::StageValue`] coercion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageValueError {
    /// The variant has no text form.
    #[error("{variant} value is not text representable")]
    NotTextRepresentable {
        /// Name of the offending variant.
        variant: &'static str,
    },
}

/// Errors raised by agent stages.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent needs text input and got none.
    #[error("agent '{agent}' received no valid input")]
    NoValidInput {
        /// Agent name.
        agent: String,
    },

    /// Model output did not decode into the requested shape.
    #[error("failed to decode output for schema '{schema}': {source}")]
    Decoding {
        /// Schema tag that was requested.
        schema: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The model kept asking for tools past the configured limit.
    #[error("agent '{agent}' exceeded {limit} tool rounds")]
    ToolRoundsExceeded {
        /// Agent name.
        agent: String,
        /// Configured cap.
        limit: usize,
    },

    /// The model collaborator reported a failure.
    #[error("LLM service error: {0}")]
    Llm(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key was passed and the environment fallback is empty.
    #[error("no API key provided and {env_var} is not set")]
    MissingApiKey {
        /// Environment variable consulted.
        env_var: &'static str,
    },

    /// Provider name is not recognised.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// Model name is not valid for the provider.
    #[error("unknown model '{model}' for provider '{provider}'")]
    UnknownModel {
        /// Provider name.
        provider: String,
        /// Rejected model name.
        model: String,
    },

    /// A config file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The tracing subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Errors from the file read and write stages.
#[derive(Debug, Error)]
pub enum FileStageError {
    /// The write stage was given nothing to write.
    #[error("no input to write to {}", path.display())]
    NoInput {
        /// Target path.
        path: PathBuf,
    },

    /// The input variant cannot be written as text.
    #[error("cannot write {variant} value to {}", path.display())]
    Unsupported {
        /// Name of the offending variant.
        variant: &'static str,
        /// Target path.
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the HTTP tool-server stage.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Server name was empty.
    #[error("invalid server name")]
    InvalidServerName,

    /// Parameters could not be assembled into a request.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The server answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decoding(String),
}

/// Errors from subprocess tool servers.
///
/// Cloneable so a discovery failure can be stored in the registry and
/// handed back on every later call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// A call targeted a server entry that names no tool.
    #[error("no tool name given for server '{server}'")]
    MissingToolName {
        /// Server name.
        server: String,
    },

    /// The server failed during discovery.
    #[error("server '{server}' is unavailable: {reason}")]
    Unavailable {
        /// Server name.
        server: String,
        /// Recorded discovery failure.
        reason: String,
    },

    /// No such tool is registered.
    #[error("tool '{tool}' not found on server '{server}'")]
    NotFound {
        /// Server name.
        server: String,
        /// Tool name.
        tool: String,
    },

    /// The server process could not be started.
    #[error("failed to launch '{server}': {message}")]
    Launch {
        /// Server name.
        server: String,
        /// Launch failure.
        message: String,
    },

    /// The server spoke something other than the expected protocol.
    #[error("protocol error from '{server}': {message}")]
    Protocol {
        /// Server name.
        server: String,
        /// Description.
        message: String,
    },

    /// The server returned a JSON-RPC error.
    #[error("server '{server}' returned error {code}: {message}")]
    Server {
        /// Server name.
        server: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The connection closed before a response arrived.
    #[error("connection to '{server}' closed")]
    ConnectionClosed {
        /// Server name.
        server: String,
    },
}

impl ToolError {
    /// Creates a launch error.
    pub fn launch(server: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Launch {
            server: server.into(),
            message: message.to_string(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(server: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Protocol {
            server: server.into(),
            message: message.to_string(),
        }
    }

    /// Returns the server the error concerns.
    #[must_use]
    pub fn server(&self) -> &str {
        match self {
            Self::MissingToolName { server }
            | Self::Unavailable { server, .. }
            | Self::NotFound { server, .. }
            | Self::Launch { server, .. }
            | Self::Protocol { server, .. }
            | Self::Server { server, .. }
            | Self::ConnectionClosed { server } => server,
        }
    }
}
