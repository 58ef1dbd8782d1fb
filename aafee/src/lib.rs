//! # Aafee
//!
//! Composable stage flows for LLM agents.
//!
//! Aafee provides:
//!
//! - **Stages**: units of work passing a tagged [`core::StageValue`] along
//! - **Flows**: linear, looped and repeat-until compositions that are stages themselves
//! - **Agents**: LLM-backed stages, with history kept by composition
//! - **Tools**: discovery and invocation of tools on local subprocess servers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aafee::prelude::*;
//! use std::sync::Arc;
//!
//! let agent = StopContinueAgent::new("planner", llm, "Plan a trip.");
//! let chat = LoopedFlow::new("chat", vec![Arc::new(StoredHistoryProvider::new(agent))])
//!     .with_decision(continue_while_instructed(read_line));
//!
//! let output = chat.execute(Some(StageValue::text("Hello"))).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod core;
pub mod errors;
pub mod events;
pub mod flow;
pub mod interceptors;
pub mod llm;
pub mod observability;
pub mod stages;
pub mod testing;
pub mod tools;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{
        OneShotAgent, StopContinueAgent, StructuredOutputAgent, ToolUsingAgent,
    };
    pub use crate::core::{Binding, ControlSignal, Instruction, Message, Role, StageValue};
    pub use crate::errors::{FlowError, StageValueError, ToolError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::flow::{
        continue_while_instructed, FlowBuilder, LinearFlow, LoopDecision, LoopedFlow,
        RepeatUntilCondition,
    };
    pub use crate::interceptors::{InterceptableStage, StoredHistoryProvider};
    pub use crate::llm::{LlmOutput, LlmService, ModelConfig};
    pub use crate::observability::LoggingConfig;
    pub use crate::stages::{
        CodeBlockExtractor, ReadFromFileStage, Stage, StagePeek, StageRef, WriteToFileStage,
    };
    #[cfg(feature = "http")]
    pub use crate::stages::{McpServerBuilder, McpServerStage};
    pub use crate::tools::{ToolInfo, ToolManager, ToolServerConfig};
}
