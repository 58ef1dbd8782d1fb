//! Agent that may call subprocess tools before answering.

use super::{require_text, send};
use crate::core::{Instruction, Message, StageValue};
use crate::errors::{AgentError, FlowError};
use crate::interceptors::{InterceptableStage, PassThrough, SendInterceptor};
use crate::llm::LlmService;
use crate::stages::{extract_code_blocks, Stage};
use crate::tools::ToolManager;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Tool calls allowed per execution unless configured otherwise.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

const ACTION_PROMPT: &str = "Reply with exactly one JSON action and no other text. \
To call a tool: {\"useTool\": {\"serverName\": \"...\", \"toolName\": \"...\", \"arguments\": {...}}}. \
To ask the user something: {\"userInput\": \"your question\"}. \
When the task is complete: {\"end\": null}. \
Tool results come back as the next user message.";

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    /// Server the tool lives on.
    pub server_name: String,
    /// Tool name.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// What the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentAction {
    /// Run a tool and report back.
    UseTool(ToolRequest),
    /// Hand the question to the user.
    UserInput(String),
    /// The task is done.
    End,
}

impl AgentAction {
    /// Parses a reply, unwrapping a fenced block if present.
    #[must_use]
    pub fn parse(reply: &str) -> Option<Self> {
        let body = extract_code_blocks(reply, None)
            .into_iter()
            .next()
            .unwrap_or_else(|| reply.trim().to_string());
        serde_json::from_str(&body).ok()
    }
}

/// Agent that discovers tools through a shared [`ToolManager`] and lets the
/// model call them until it asks the user something or finishes.
///
/// A `userInput` action yields a continue instruction carrying the
/// question; `end` yields an end instruction carrying the raw reply; any
/// other reply is returned as text. Tools are unloaded before returning.
#[derive(Clone)]
pub struct ToolUsingAgent {
    name: String,
    llm: Arc<dyn LlmService>,
    prompt: String,
    tools: Arc<ToolManager>,
    max_tool_rounds: usize,
}

impl ToolUsingAgent {
    /// Creates an agent using the tools managed by `tools`.
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmService>,
        prompt: impl Into<String>,
        tools: Arc<ToolManager>,
    ) -> Self {
        Self {
            name: name.into(),
            llm,
            prompt: prompt.into(),
            tools,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Caps the number of tool calls per execution.
    #[must_use]
    pub const fn with_max_tool_rounds(mut self, limit: usize) -> Self {
        self.max_tool_rounds = limit;
        self
    }

    async fn template(&self) -> Vec<Message> {
        let listing = self.tools.describe_tools().await;
        let listing = if listing.is_empty() {
            "No tools are available.".to_string()
        } else {
            format!("Available tools:\n{listing}")
        };
        vec![
            Message::system(self.prompt.as_str()),
            Message::system(format!("{listing}\n{ACTION_PROMPT}")),
        ]
    }

    async fn run_tool(&self, request: ToolRequest) -> Result<String, FlowError> {
        let ToolRequest {
            server_name,
            tool_name,
            arguments,
        } = request;
        let not_available =
            || format!("Tool '{tool_name}' on server '{server_name}' is not available.");

        let Some(tool) = self.tools.find_tool(&server_name, &tool_name).await else {
            debug!(agent = %self.name, server = %server_name, tool = %tool_name, "model asked for unknown tool");
            return Ok(not_available());
        };
        info!(agent = %self.name, server = %server_name, tool = %tool_name, "calling tool");
        Ok(match self.tools.call(&tool, arguments).await? {
            Some(outcome) if outcome.is_error => {
                format!("Tool '{tool_name}' failed:\n{}", outcome.content)
            }
            Some(outcome) => format!("Tool '{tool_name}' returned:\n{}", outcome.content),
            None => not_available(),
        })
    }

    async fn converse(
        &self,
        text: String,
        interceptor: &dyn SendInterceptor,
    ) -> Result<StageValue, FlowError> {
        let template = self.template().await;
        let mut next = Message::user(text);
        let mut rounds = 0usize;
        loop {
            let reply = send(
                &self.name,
                self.llm.as_ref(),
                interceptor,
                &template,
                std::slice::from_ref(&next),
            )
            .await?;

            match AgentAction::parse(&reply) {
                Some(AgentAction::UseTool(request)) => {
                    if rounds == self.max_tool_rounds {
                        return Err(AgentError::ToolRoundsExceeded {
                            agent: self.name.clone(),
                            limit: self.max_tool_rounds,
                        }
                        .into());
                    }
                    rounds += 1;
                    next = Message::user(self.run_tool(request).await?);
                }
                Some(AgentAction::UserInput(question)) => {
                    return Ok(Instruction::proceed(question).into())
                }
                Some(AgentAction::End) => return Ok(Instruction::end(reply).into()),
                None => return Ok(StageValue::Text(reply)),
            }
        }
    }
}

impl fmt::Debug for ToolUsingAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolUsingAgent")
            .field("name", &self.name)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ToolUsingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.execute_intercepted(input, &PassThrough).await
    }
}

#[async_trait]
impl InterceptableStage for ToolUsingAgent {
    async fn execute_intercepted(
        &self,
        input: Option<StageValue>,
        interceptor: &dyn SendInterceptor,
    ) -> Result<StageValue, FlowError> {
        let text = require_text(&self.name, input.as_ref())?;
        self.tools.load_available_tools().await;
        let result = self.converse(text, interceptor).await;
        self.tools.unload().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_continue, assert_end, FakeConnection, FakeLauncher, ScriptedLlm};
    use crate::tools::protocol::ToolDescriptor;
    use crate::tools::ToolServerConfig;
    use serde_json::json;

    fn manager(math: Arc<FakeConnection>) -> Arc<ToolManager> {
        Arc::new(
            ToolManager::new(vec![ToolServerConfig::new("math", "/bin/math")])
                .with_launcher(Arc::new(FakeLauncher::new().with_shared_server(math))),
        )
    }

    fn math() -> Arc<FakeConnection> {
        Arc::new(FakeConnection::new("math").with_tool(
            ToolDescriptor::new("add").with_description("Adds two numbers"),
            "3",
        ))
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            AgentAction::parse(r#"{"userInput": "Which city?"}"#),
            Some(AgentAction::UserInput("Which city?".into()))
        );
        assert_eq!(AgentAction::parse(r#"{"end": null}"#), Some(AgentAction::End));
        assert_eq!(
            AgentAction::parse("```json\n{\"useTool\": {\"serverName\": \"s\", \"toolName\": \"t\"}}\n```"),
            Some(AgentAction::UseTool(ToolRequest {
                server_name: "s".into(),
                tool_name: "t".into(),
                arguments: Map::new(),
            }))
        );
        assert_eq!(AgentAction::parse("just words"), None);
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back() {
        let math = math();
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"useTool": {"serverName": "math", "toolName": "add", "arguments": {"a": 1, "b": 2}}}"#,
            r#"{"userInput": "Anything else?"}"#,
        ]));
        let agent = ToolUsingAgent::new("calc", llm.clone(), "Do sums.", manager(math.clone()));

        let output = agent.execute(Some(StageValue::text("1 + 2"))).await.unwrap();

        assert_continue(&output);
        assert_eq!(output.instruction().unwrap().text, "Anything else?");
        let calls = llm.calls();
        assert!(calls[0][1].text.contains("server: math, tool: add"));
        assert_eq!(calls[1].last().unwrap().text, "Tool 'add' returned:\n3");
        let expected = json!({"a": 1, "b": 2});
        assert_eq!(math.calls(), vec![("add".to_string(), expected.as_object().unwrap().clone())]);
        assert_eq!(math.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_end_and_plain_replies() {
        let llm = Arc::new(ScriptedLlm::new([r#"{"end": null}"#, "plain answer"]));
        let agent = ToolUsingAgent::new("calc", llm, "Do sums.", manager(math()));

        let ended = agent.execute(Some(StageValue::text("done?"))).await.unwrap();
        assert_end(&ended);
        assert_eq!(ended.instruction().unwrap().text, r#"{"end": null}"#);

        let plain = agent.execute(Some(StageValue::text("again"))).await.unwrap();
        assert_eq!(plain, StageValue::text("plain answer"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"useTool": {"serverName": "math", "toolName": "sqrt"}}"#,
            "ok",
        ]));
        let agent = ToolUsingAgent::new("calc", llm.clone(), "Do sums.", manager(math()));

        agent.execute(Some(StageValue::text("sqrt 9"))).await.unwrap();

        assert_eq!(
            llm.calls()[1].last().unwrap().text,
            "Tool 'sqrt' on server 'math' is not available."
        );
    }

    #[tokio::test]
    async fn test_tool_rounds_are_capped() {
        let call = r#"{"useTool": {"serverName": "math", "toolName": "add"}}"#;
        let llm = Arc::new(ScriptedLlm::new([call, call]));
        let math = math();
        let agent = ToolUsingAgent::new("calc", llm, "Do sums.", manager(math.clone()))
            .with_max_tool_rounds(1);

        let err = agent.execute(Some(StageValue::text("loop"))).await.unwrap_err();

        assert!(matches!(
            err,
            FlowError::Agent(AgentError::ToolRoundsExceeded { limit: 1, .. })
        ));
        assert_eq!(math.calls().len(), 1);
        assert_eq!(math.disconnect_count(), 1);
    }
}
