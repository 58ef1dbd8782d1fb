//! Agent whose reply is decoded as JSON against a named schema.

use super::{require_text, send};
use crate::core::{Message, StageValue};
use crate::errors::{AgentError, FlowError};
use crate::interceptors::{InterceptableStage, PassThrough, SendInterceptor};
use crate::llm::LlmService;
use crate::stages::{extract_code_blocks, Stage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Asks the model for JSON matching `schema` and returns it as
/// [`StageValue::Structured`] tagged with `schema_tag`.
///
/// A reply wrapped in a fenced code block is unwrapped first.
#[derive(Clone)]
pub struct StructuredOutputAgent {
    name: String,
    llm: Arc<dyn LlmService>,
    prompt: String,
    schema_tag: String,
    schema: Value,
}

impl StructuredOutputAgent {
    /// Creates an agent decoding replies against `schema`.
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmService>,
        prompt: impl Into<String>,
        schema_tag: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            llm,
            prompt: prompt.into(),
            schema_tag: schema_tag.into(),
            schema,
        }
    }

    /// Decodes a structured value produced by this agent into `T`.
    pub fn decode<T: DeserializeOwned>(value: &StageValue) -> Result<T, AgentError> {
        match value {
            StageValue::Structured { schema_tag, payload } => serde_json::from_value(payload.clone())
                .map_err(|source| AgentError::Decoding {
                    schema: schema_tag.clone(),
                    source,
                }),
            other => Err(AgentError::Llm(format!(
                "expected a structured value, got {}",
                other.variant_name()
            ))),
        }
    }

    fn schema_message(&self) -> Message {
        Message::system(format!(
            "Respond only with a JSON document matching this JSON schema, with no other text:\n{}",
            self.schema
        ))
    }

    fn parse_reply(&self, reply: &str) -> Result<Value, AgentError> {
        let body = extract_code_blocks(reply, None)
            .into_iter()
            .next()
            .unwrap_or_else(|| reply.trim().to_string());
        serde_json::from_str(&body).map_err(|source| AgentError::Decoding {
            schema: self.schema_tag.clone(),
            source,
        })
    }
}

impl fmt::Debug for StructuredOutputAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredOutputAgent")
            .field("name", &self.name)
            .field("schema_tag", &self.schema_tag)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for StructuredOutputAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        self.execute_intercepted(input, &PassThrough).await
    }
}

#[async_trait]
impl InterceptableStage for StructuredOutputAgent {
    async fn execute_intercepted(
        &self,
        input: Option<StageValue>,
        interceptor: &dyn SendInterceptor,
    ) -> Result<StageValue, FlowError> {
        let text = require_text(&self.name, input.as_ref())?;
        let template = [Message::system(self.prompt.as_str()), self.schema_message()];
        let reply = send(
            &self.name,
            self.llm.as_ref(),
            interceptor,
            &template,
            &[Message::user(text)],
        )
        .await?;
        let payload = self.parse_reply(&reply)?;
        Ok(StageValue::Structured {
            schema_tag: self.schema_tag.clone(),
            payload,
        })
    }
}
