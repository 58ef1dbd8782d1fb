//! Mock stages and model services.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::{Message, StageValue};
use crate::errors::{AgentError, FlowError};
use crate::llm::{LlmOutput, LlmService};
use crate::stages::Stage;

/// A stage that always returns the same value.
#[derive(Debug, Clone)]
pub struct StaticStage {
    name: String,
    value: StageValue,
}

impl StaticStage {
    /// Creates a new static stage.
    #[must_use]
    pub fn new(name: impl Into<String>, value: StageValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[async_trait]
impl Stage for StaticStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: Option<StageValue>) -> Result<StageValue, FlowError> {
        Ok(self.value.clone())
    }
}

/// A stage that always fails with [`FlowError::Stage`].
#[derive(Debug, Clone)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: Option<StageValue>) -> Result<StageValue, FlowError> {
        Err(FlowError::stage(&self.name, &self.error))
    }
}

/// A stage that records every input and returns a fixed output.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    output: StageValue,
    inputs: Mutex<Vec<Option<StageValue>>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>, output: StageValue) -> Self {
        Self {
            name: name.into(),
            output,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded inputs.
    #[must_use]
    pub fn inputs(&self) -> Vec<Option<StageValue>> {
        self.inputs.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Clears recorded inputs.
    pub fn clear(&self) {
        self.inputs.lock().clear();
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.inputs.lock().push(input);
        Ok(self.output.clone())
    }
}

/// A stage returning a scripted sequence of outputs.
///
/// Once the script runs out every call yields [`StageValue::None`].
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    outputs: Mutex<VecDeque<StageValue>>,
    inputs: Mutex<Vec<Option<StageValue>>>,
}

impl ScriptedStage {
    /// Creates a new scripted stage.
    #[must_use]
    pub fn new(name: impl Into<String>, outputs: Vec<StageValue>) -> Self {
        Self {
            name: name.into(),
            outputs: Mutex::new(outputs.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded inputs.
    #[must_use]
    pub fn inputs(&self) -> Vec<Option<StageValue>> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.inputs.lock().push(input);
        Ok(self.outputs.lock().pop_front().unwrap_or_default())
    }
}

/// A model service replying from a script and recording what it was sent.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    /// Creates a service that returns `replies` in order.
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the message lists received, one per call.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn run(&self, messages: &[Message]) -> Result<LlmOutput, FlowError> {
        self.calls.lock().push(messages.to_vec());
        let reply = self.replies.lock().pop_front();
        reply
            .map(LlmOutput::new)
            .ok_or_else(|| AgentError::Llm("script exhausted".to_string()).into())
    }
}
