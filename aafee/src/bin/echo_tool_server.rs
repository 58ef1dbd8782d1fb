//! Minimal tool server speaking newline-delimited JSON-RPC over stdio.
//!
//! Tools: `echo`, `add`, `fail` and `env`. Tool listings are paginated two
//! per page so clients exercise `nextCursor`.

use aafee::observability::LoggingConfig;
use aafee::tools::protocol::{
    CallToolResult, ContentBlock, JsonRpcMessage, ListToolsResult, ToolDescriptor,
    PROTOCOL_VERSION,
};
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

const PAGE_SIZE: usize = 2;

fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new("echo")
            .with_description("Returns the given text")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })),
        ToolDescriptor::new("add")
            .with_description("Adds two numbers")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            })),
        ToolDescriptor::new("fail").with_description("Always reports an error"),
        ToolDescriptor::new("env")
            .with_description("Reads an environment variable")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            })),
    ]
}

fn list_tools(params: Option<&Value>) -> Value {
    let start = params
        .and_then(|p| p.get("cursor"))
        .and_then(Value::as_str)
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0);
    let all = tools();
    let end = (start + PAGE_SIZE).min(all.len());
    let page = ListToolsResult {
        tools: all.get(start..end).unwrap_or_default().to_vec(),
        next_cursor: (end < all.len()).then(|| end.to_string()),
    };
    serde_json::to_value(page).unwrap_or(Value::Null)
}

fn call_tool(name: &str, arguments: &Map<String, Value>) -> CallToolResult {
    let text_arg = |key: &str| arguments.get(key).and_then(Value::as_str).unwrap_or_default();
    let (text, is_error) = match name {
        "echo" => (text_arg("text").to_string(), false),
        "add" => {
            let a = arguments.get("a").and_then(Value::as_f64);
            let b = arguments.get("b").and_then(Value::as_f64);
            match (a, b) {
                (Some(a), Some(b)) => ((a + b).to_string(), false),
                _ => ("add needs numeric 'a' and 'b'".to_string(), true),
            }
        }
        "fail" => ("this tool always fails".to_string(), true),
        "env" => match std::env::var(text_arg("name")) {
            Ok(value) => (value, false),
            Err(_) => (format!("{} is not set", text_arg("name")), true),
        },
        other => (format!("unknown tool '{other}'"), true),
    };
    CallToolResult {
        content: vec![ContentBlock::text(text)],
        is_error: Some(is_error),
    }
}

fn handle(message: &JsonRpcMessage) -> Option<JsonRpcMessage> {
    let method = message.method.as_deref()?;
    // Notifications get no reply.
    let id = message.id.clone()?;
    let params = message.params.as_ref();
    let reply = match method {
        "initialize" => JsonRpcMessage::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "echo_tool_server", "version": env!("CARGO_PKG_VERSION")},
            }),
        ),
        "ping" => JsonRpcMessage::success(id, json!({})),
        "tools/list" => JsonRpcMessage::success(id, list_tools(params)),
        "tools/call" => {
            let name = params.and_then(|p| p.get("name")).and_then(Value::as_str);
            let arguments = params
                .and_then(|p| p.get("arguments"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            match name {
                Some(name) => JsonRpcMessage::success(
                    id,
                    serde_json::to_value(call_tool(name, &arguments)).unwrap_or(Value::Null),
                ),
                None => JsonRpcMessage::failure(id, -32602, "missing tool name"),
            }
        }
        other => JsonRpcMessage::failure(id, -32601, format!("method not found: {other}")),
    };
    Some(reply)
}

#[tokio::main]
async fn main() -> Result<()> {
    LoggingConfig::new()
        .with_filter("warn")
        .with_stderr(true)
        .init()?;
    info!("echo tool server started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let message: JsonRpcMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "ignoring malformed line");
                continue;
            }
        };
        if let Some(reply) = handle(&message) {
            stdout
                .write_all(reply.to_line().as_bytes())
                .await
                .context("writing stdout")?;
            stdout.flush().await.context("flushing stdout")?;
        }
    }
    Ok(())
}
