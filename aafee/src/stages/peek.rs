//! Pass-through stage that exposes the value flowing past it.

use super::Stage;
use crate::core::{Binding, StageValue};
use crate::errors::FlowError;
use async_trait::async_trait;
use tracing::debug;

/// Text stored when the peeked input is absent or has no text form.
pub const NO_INPUT: &str = "NO INPUT";

/// Writes the text of its input to a binding and returns the input
/// unchanged. Absent input becomes [`StageValue::None`].
#[derive(Debug, Clone)]
pub struct StagePeek {
    name: String,
    binding: Binding<String>,
}

impl StagePeek {
    /// Creates a peek stage writing to `binding`.
    pub fn new(binding: Binding<String>) -> Self {
        Self {
            name: "peek".to_string(),
            binding,
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Stage for StagePeek {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let text = input
            .as_ref()
            .and_then(|value| value.as_text().ok())
            .map_or_else(|| NO_INPUT.to_string(), std::borrow::Cow::into_owned);
        debug!(stage = %self.name, peeked = %text, "peek");
        self.binding.set(text);
        Ok(input.unwrap_or_default())
    }
}
