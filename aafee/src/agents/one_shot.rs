//! Single prompt, single reply.

use super::{require_text, send};
use crate::core::{Message, StageValue};
use crate::errors::FlowError;
use crate::interceptors::{InterceptableStage, PassThrough, SendInterceptor};
use crate::llm::LlmService;
use crate::stages::Stage;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Sends a system prompt plus the input text and returns the reply as text.
#[derive(Clone)]
pub struct OneShotAgent {
    name: String,
    llm: Arc<dyn LlmService>,
    prompt: String,
}

impl OneShotAgent {
    /// Creates an agent with the given system prompt.
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmService>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            llm,
            prompt: prompt.into(),
        }
    }
}

impl fmt::Debug for OneShotAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotAgent")
            .field("name", &self.name)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for OneShotAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.execute_intercepted(input, &PassThrough).await
    }
}

#[async_trait]
impl InterceptableStage for OneShotAgent {
    async fn execute_intercepted(
        &self,
        input: Option<StageValue>,
        interceptor: &dyn SendInterceptor,
    ) -> Result<StageValue, FlowError> {
        let text = require_text(&self.name, input.as_ref())?;
        let reply = send(
            &self.name,
            self.llm.as_ref(),
            interceptor,
            &[Message::system(self.prompt.as_str())],
            &[Message::user(text)],
        )
        .await?;
        Ok(StageValue::Text(reply))
    }
}
