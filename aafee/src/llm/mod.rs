//! The LLM collaborator seam.
//!
//! Agent stages talk to a model only through [`LlmService`]. Provider HTTP
//! clients live outside this crate; [`ModelConfig`] validates the provider
//! and model selection they are built from.

mod config;

pub use config::{ModelConfig, ProviderModel, XAiModel, API_KEY_ENV};

use crate::core::Message;
use crate::errors::FlowError;
use async_trait::async_trait;

/// Text produced by a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmOutput {
    /// Raw model output.
    pub text: String,
}

impl LlmOutput {
    /// Wraps model output text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A chat-completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Sends `messages` in order and returns the model's reply.
    async fn run(&self, messages: &[Message]) -> Result<LlmOutput, FlowError>;
}
