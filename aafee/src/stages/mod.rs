//! Stage trait and built-in stages.
//!
//! A stage takes an optional [`StageValue`] and produces a new one. Flows,
//! agents and I/O steps all implement [`Stage`], so they compose freely.

mod extract;
mod file;
#[cfg(feature = "http")]
mod http_mcp;
mod peek;

pub use extract::CodeBlockExtractor;
pub(crate) use extract::extract_code_blocks;
pub use file::{ReadFromFileStage, WriteToFileStage};
#[cfg(feature = "http")]
pub use http_mcp::{
    firecrawl, FirecrawlFunction, McpServerBuilder, McpServerStage, DEFAULT_MCP_BASE_URL,
};
pub use peek::{StagePeek, NO_INPUT};

use crate::core::StageValue;
use crate::errors::FlowError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A unit of work in a flow.
///
/// Implementations must not mutate their input; they return a new value or
/// an error. A failing stage aborts the enclosing flow.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// `input` is `None` when the previous step produced nothing or the
    /// flow was started without input.
    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError>;
}

/// Owned, shareable handle to a stage.
pub type StageRef = Arc<dyn Stage>;

#[async_trait]
impl<S: Stage + ?Sized> Stage for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        (**self).execute(input).await
    }
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(Option<StageValue>) -> Result<StageValue, FlowError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(Option<StageValue>) -> Result<StageValue, FlowError> + Send + Sync,
{
    /// Creates a new closure stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(Option<StageValue>) -> Result<StageValue, FlowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(Option<StageValue>) -> Result<StageValue, FlowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        (self.func)(input)
    }
}

/// A stage backed by an async closure.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(Option<StageValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageValue, FlowError>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(Option<StageValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageValue, FlowError>> + Send,
{
    /// Creates a new async closure stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(Option<StageValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageValue, FlowError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(Option<StageValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageValue, FlowError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        (self.func)(input).await
    }
}

/// Returns the text of `input` if it has one.
pub(crate) fn input_text(input: Option<&StageValue>) -> Option<String> {
    input
        .and_then(|value| value.as_text().ok())
        .map(std::borrow::Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("upper", |input: Option<StageValue>| {
            let text = input.map(|v| v.to_string()).unwrap_or_default();
            Ok(StageValue::text(text.to_uppercase()))
        });

        assert_eq!(stage.name(), "upper");
        let output = stage.execute(Some(StageValue::text("abc"))).await.unwrap();
        assert_eq!(output, StageValue::text("ABC"));
    }

    #[tokio::test]
    async fn test_async_fn_stage() {
        let stage = AsyncFnStage::new("echo", |input: Option<StageValue>| async move {
            Ok(input.unwrap_or_default())
        });

        assert_eq!(stage.execute(None).await.unwrap(), StageValue::None);
        assert!(format!("{stage:?}").contains("echo"));
    }

    #[tokio::test]
    async fn test_arc_stage_delegates() {
        let stage: StageRef = Arc::new(FnStage::new("const", |_| Ok(StageValue::text("x"))));
        let shared = Arc::clone(&stage);
        assert_eq!(shared.name(), "const");
        assert_eq!(shared.execute(None).await.unwrap(), StageValue::text("x"));
    }
}
