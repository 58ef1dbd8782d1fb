//! Tool servers spoken to over a child process's stdin and stdout.
//!
//! One JSON-RPC message per line. A background task reads stdout and routes
//! responses to waiting callers by id; stderr is forwarded to `tracing`.

use super::config::ToolServerConfig;
use super::connection::{ToolConnection, ToolServerLauncher};
use super::protocol::{
    CallToolResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, ListToolsResult,
    ToolDescriptor, CLIENT_VERSION, PROTOCOL_VERSION,
};
use crate::errors::ToolError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type PendingMap = Mutex<HashMap<i64, oneshot::Sender<Result<Value, ToolError>>>>;

/// A running tool server child process.
///
/// The child is killed when the connection is dropped or disconnected.
pub struct StdioToolConnection {
    server: String,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Arc<PendingMap>,
    next_id: AtomicI64,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl StdioToolConnection {
    /// Starts the server process and completes the handshake.
    pub async fn connect(config: &ToolServerConfig) -> Result<Self, ToolError> {
        let server = config.name.clone();
        info!(
            server = %server,
            executable = %config.executable_path.display(),
            "starting tool server"
        );

        let mut child = Command::new(&config.executable_path)
            .args(&config.arguments)
            .envs(&config.environment)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::launch(&server, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::launch(&server, "child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::launch(&server, "child has no stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let name = server.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Ok(Some(line)) = next_line(&mut reader, &mut buf, &name).await {
                    let line = line.trim();
                    if !line.is_empty() {
                        debug!(server = %name, "stderr: {line}");
                    }
                }
            });
        }

        let stdin = Arc::new(tokio::sync::Mutex::new(stdin));
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            server.clone(),
            stdout,
            Arc::clone(&stdin),
            Arc::clone(&pending),
            Arc::clone(&alive),
        ));

        let connection = Self {
            server,
            stdin,
            child: tokio::sync::Mutex::new(Some(child)),
            pending,
            next_id: AtomicI64::new(1),
            alive,
            reader,
        };
        connection.initialize().await?;
        Ok(connection)
    }

    /// Returns false once the server has exited or been disconnected.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn closed(&self) -> ToolError {
        ToolError::ConnectionClosed {
            server: self.server.clone(),
        }
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        let result = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": self.server,
                        "version": CLIENT_VERSION,
                    },
                })),
            )
            .await?;
        debug!(
            server = %self.server,
            protocol = ?result.get("protocolVersion"),
            server_info = ?result.get("serverInfo"),
            "tool server initialised"
        );
        self.notify("notifications/initialized", None).await
    }

    async fn write_message<T: Serialize>(&self, message: &T) -> Result<(), ToolError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| ToolError::protocol(&self.server, e))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| self.closed())?;
        stdin.flush().await.map_err(|_| self.closed())
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ToolError> {
        self.write_message(&JsonRpcNotification::new(method, params))
            .await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        if !self.is_alive() {
            return Err(self.closed());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        // The reader clears pending after marking the connection dead.
        if !self.is_alive() {
            self.pending.lock().remove(&id);
            return Err(self.closed());
        }

        if let Err(err) = self
            .write_message(&JsonRpcRequest::new(id, method, params))
            .await
        {
            self.pending.lock().remove(&id);
            return Err(err);
        }
        debug!(server = %self.server, id, method, "request sent");
        rx.await.unwrap_or_else(|_| Err(self.closed()))
    }
}

impl fmt::Debug for StdioToolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioToolConnection")
            .field("server", &self.server)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl Drop for StdioToolConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl ToolConnection for StdioToolConnection {
    fn server_name(&self) -> &str {
        &self.server
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| ToolError::protocol(&self.server, e))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(server = %self.server, count = tools.len(), "listed tools");
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ToolError> {
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| ToolError::protocol(&self.server, e))
    }

    async fn disconnect(&self) -> Result<(), ToolError> {
        self.alive.store(false, Ordering::SeqCst);
        self.pending.lock().clear();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(server = %self.server, error = %err, "tool server already exited");
            }
        }
        self.reader.abort();
        info!(server = %self.server, "tool server disconnected");
        Ok(())
    }
}

/// Reads the next newline-terminated line, skipping lines that are not
/// UTF-8. Returns `Ok(None)` at end of stream.
async fn next_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    server: &str,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        buf.clear();
        if reader.read_until(b'\n', buf).await? == 0 {
            return Ok(None);
        }
        match std::str::from_utf8(buf) {
            Ok(line) => return Ok(Some(line.to_string())),
            Err(err) => debug!(server, error = %err, "skipping non-UTF-8 line"),
        }
    }
}

async fn read_loop(
    server: String,
    stdout: ChildStdout,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    pending: Arc<PendingMap>,
    alive: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        let line = match next_line(&mut reader, &mut buf, &server).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(server = %server, error = %err, "failed to read from tool server");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(_) => {
                debug!(server = %server, "ignoring non-JSON output: {line}");
                continue;
            }
        };

        if let Some(id) = message.response_id() {
            let Some(tx) = pending.lock().remove(&id) else {
                debug!(server = %server, id, "response for unknown request");
                continue;
            };
            let outcome = match message.error {
                Some(error) => Err(ToolError::Server {
                    server: server.clone(),
                    code: error.code,
                    message: error.message,
                }),
                None => Ok(message.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        } else if let (Some(method), Some(id)) = (message.method.as_deref(), message.id.clone()) {
            let reply = if method == "ping" {
                JsonRpcMessage::success(id, json!({}))
            } else {
                JsonRpcMessage::failure(id, -32601, format!("method not found: {method}"))
            };
            let mut stdin = stdin.lock().await;
            if stdin.write_all(reply.to_line().as_bytes()).await.is_err() {
                break;
            }
            let _ = stdin.flush().await;
        } else {
            debug!(server = %server, method = ?message.method, "notification from tool server");
        }
    }

    alive.store(false, Ordering::SeqCst);
    pending.lock().clear();
    debug!(server = %server, "tool server output closed");
}

/// Launches servers as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioLauncher;

#[async_trait]
impl ToolServerLauncher for StdioLauncher {
    async fn connect(&self, config: &ToolServerConfig) -> Result<Arc<dyn ToolConnection>, ToolError> {
        let connection = StdioToolConnection::connect(config).await?;
        Ok(Arc::new(connection))
    }
}
