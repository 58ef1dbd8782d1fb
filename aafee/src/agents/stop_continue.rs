//! Agent that tags each reply with whether the conversation should go on.

use super::{require_text, send};
use crate::core::{ControlSignal, Instruction, Message, StageValue};
use crate::errors::FlowError;
use crate::interceptors::{InterceptableStage, PassThrough, SendInterceptor};
use crate::llm::LlmService;
use crate::stages::Stage;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// System prompt teaching the model the instruction marker.
pub const STOP_CONTINUE_PROMPT: &str = "You're a helpful agent that should do what is requested in your prompt, \
but you may take input in order to satisfy that prompt. To cater to that, after each reply you should include \
an instruction of whether to CONTINUE or END, depending on whether you need input or the conversation is finished. \
The instruction should be formatted as `[INSTRUCTION: {CONTINUE | END}]`. For example, if you're waiting for the \
user to input a city you would end with `[INSTRUCTION: CONTINUE]`.";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INSTRUCTION: (CONTINUE|END)\]")
        .unwrap_or_else(|err| unreachable!("invalid marker pattern: {err}"))
});

/// Interprets model output. The last marker wins; output with no marker is
/// plain text. The instruction keeps the full output as its text.
pub fn parse_instruction(output: String) -> StageValue {
    let control = MARKER
        .captures_iter(&output)
        .last()
        .map(|caps| match &caps[1] {
            "END" => ControlSignal::End,
            _ => ControlSignal::Continue,
        });
    match control {
        Some(control) => StageValue::Instruction(Instruction {
            text: output,
            control,
        }),
        None => StageValue::Text(output),
    }
}

/// Conversational agent whose replies carry a continue or end signal.
///
/// Pair it with a [`crate::flow::LoopedFlow`] and
/// [`crate::flow::continue_while_instructed`] for a chat loop.
#[derive(Clone)]
pub struct StopContinueAgent {
    name: String,
    llm: Arc<dyn LlmService>,
    prompt: String,
}

impl StopContinueAgent {
    /// Creates an agent with the given task prompt.
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmService>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            llm,
            prompt: prompt.into(),
        }
    }
}

impl fmt::Debug for StopContinueAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopContinueAgent")
            .field("name", &self.name)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for StopContinueAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.execute_intercepted(input, &PassThrough).await
    }
}

#[async_trait]
impl InterceptableStage for StopContinueAgent {
    async fn execute_intercepted(
        &self,
        input: Option<StageValue>,
        interceptor: &dyn SendInterceptor,
    ) -> Result<StageValue, FlowError> {
        let text = require_text(&self.name, input.as_ref())?;
        let template = [
            Message::system(STOP_CONTINUE_PROMPT),
            Message::system(self.prompt.as_str()),
        ];
        let reply = send(
            &self.name,
            self.llm.as_ref(),
            interceptor,
            &template,
            &[Message::user(text)],
        )
        .await?;
        Ok(parse_instruction(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::StoredHistoryProvider;
    use crate::testing::ScriptedLlm;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_end_marker() {
        let value = parse_instruction("Done. [INSTRUCTION: END]".to_string());
        assert_eq!(
            value,
            StageValue::Instruction(Instruction::end("Done. [INSTRUCTION: END]"))
        );
    }

    #[test]
    fn test_last_marker_wins() {
        let value =
            parse_instruction("[INSTRUCTION: END] wait, which city? [INSTRUCTION: CONTINUE]".into());
        assert_eq!(value.instruction().unwrap().control, ControlSignal::Continue);
    }

    #[test]
    fn test_no_marker_is_text() {
        assert_eq!(
            parse_instruction("[INSTRUCTION: MAYBE]".into()),
            StageValue::text("[INSTRUCTION: MAYBE]")
        );
    }

    #[tokio::test]
    async fn test_message_layout() {
        let llm = Arc::new(ScriptedLlm::new(["Which city? [INSTRUCTION: CONTINUE]"]));
        let agent = StopContinueAgent::new("weather", llm.clone(), "Find the weather.");

        let output = agent.execute(Some(StageValue::text("hello"))).await.unwrap();

        assert_eq!(
            output,
            StageValue::Instruction(Instruction::proceed("Which city? [INSTRUCTION: CONTINUE]"))
        );
        assert_eq!(
            llm.calls()[0],
            vec![
                Message::system(STOP_CONTINUE_PROMPT),
                Message::system("Find the weather."),
                Message::user("hello"),
            ]
        );
    }

    #[tokio::test]
    async fn test_with_history_records_raw_reply() {
        let llm = Arc::new(ScriptedLlm::new([
            "Which city? [INSTRUCTION: CONTINUE]",
            "Sunny. [INSTRUCTION: END]",
        ]));
        let chat = StoredHistoryProvider::new(StopContinueAgent::new("weather", llm.clone(), "p"));

        chat.execute(Some(StageValue::text("hi"))).await.unwrap();
        let output = chat.execute(Some(StageValue::text("Paris"))).await.unwrap();

        assert!(output.instruction().unwrap().is_end());
        assert_eq!(llm.calls()[1].len(), 5);
        assert_eq!(
            llm.calls()[1][3],
            Message::agent("Which city? [INSTRUCTION: CONTINUE]")
        );
    }
}
