//! Message interception around LLM-backed stages.
//!
//! An [`InterceptableStage`] builds its template and input messages, hands
//! them to a [`SendInterceptor`] for the final list, calls the model, and
//! passes the raw reply back through the interceptor. Wrappers such as
//! [`StoredHistoryProvider`] own the stage they wrap and supply the
//! interceptor per call, so no hook is ever installed on the wrapped stage.

mod history;

pub use history::{MessageHistory, StoredHistoryProvider};

use crate::core::{Message, StageValue};
use crate::errors::FlowError;
use crate::stages::Stage;
use async_trait::async_trait;

/// Rewrites the messages sent to a model and the text it returns.
pub trait SendInterceptor: Send + Sync {
    /// Returns the messages to send. Defaults to `template ++ input`.
    fn pre_send(&self, template: &[Message], input: &[Message]) -> Vec<Message> {
        template.iter().chain(input).cloned().collect()
    }

    /// Returns the text the stage should use. Defaults to `output`.
    fn post_send(&self, output: String) -> String {
        output
    }
}

/// Interceptor that changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl SendInterceptor for PassThrough {}

/// A stage whose model traffic can be intercepted.
///
/// Implementations run `execute` as `execute_intercepted(input, &PassThrough)`.
#[async_trait]
pub trait InterceptableStage: Stage {
    /// Executes the stage, routing messages and output through `interceptor`.
    async fn execute_intercepted(
        &self,
        input: Option<StageValue>,
        interceptor: &dyn SendInterceptor,
    ) -> Result<StageValue, FlowError>;
}
