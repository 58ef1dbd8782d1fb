//! LLM-backed stages.
//!
//! Every agent builds a template (system prompts) and an input (the user
//! turn), lets a [`SendInterceptor`] assemble the final message list, calls
//! the injected [`LlmService`], and passes the reply through the same
//! interceptor before interpreting it.

mod one_shot;
mod stop_continue;
mod structured;
mod tool_using;

pub use one_shot::OneShotAgent;
pub use stop_continue::{parse_instruction, StopContinueAgent, STOP_CONTINUE_PROMPT};
pub use structured::StructuredOutputAgent;
pub use tool_using::{AgentAction, ToolRequest, ToolUsingAgent, DEFAULT_MAX_TOOL_ROUNDS};

use crate::core::{Message, StageValue};
use crate::errors::{AgentError, FlowError};
use crate::interceptors::SendInterceptor;
use crate::llm::LlmService;
use crate::stages::input_text;
use tracing::debug;

/// Returns the input text or [`AgentError::NoValidInput`].
fn require_text(agent: &str, input: Option<&StageValue>) -> Result<String, AgentError> {
    input_text(input).ok_or_else(|| AgentError::NoValidInput {
        agent: agent.to_string(),
    })
}

/// Runs one intercepted model call and returns the post-send text.
async fn send(
    agent: &str,
    llm: &dyn LlmService,
    interceptor: &dyn SendInterceptor,
    template: &[Message],
    input: &[Message],
) -> Result<String, FlowError> {
    let messages = interceptor.pre_send(template, input);
    debug!(agent, messages = messages.len(), "sending to model");
    let output = llm.run(&messages).await?;
    Ok(interceptor.post_send(output.text))
}
