//! Launch configuration for subprocess tool servers.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How to start one tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerConfig {
    /// Server name, used as the registry key.
    pub name: String,
    /// Program to run.
    pub executable_path: PathBuf,
    /// Command-line arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ToolServerConfig {
    /// Creates a config with no arguments and no extra environment.
    pub fn new(name: impl Into<String>, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable_path: executable_path.into(),
            arguments: Vec::new(),
            environment: BTreeMap::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    List(Vec<ToolServerConfig>),
    Wrapped { servers: Vec<ToolServerConfig> },
}

/// Parses server configs from JSON text: either an array or an object with
/// a `servers` array.
pub fn parse_server_configs(text: &str) -> Result<Vec<ToolServerConfig>, serde_json::Error> {
    Ok(match serde_json::from_str(text)? {
        ConfigFile::List(servers) | ConfigFile::Wrapped { servers } => servers,
    })
}

/// Loads server configs from a JSON file.
pub fn load_server_configs(path: impl AsRef<Path>) -> Result<Vec<ToolServerConfig>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_server_configs(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
