//! Core value types shared by stages and flows.
//!
//! - [`StageValue`]: the tagged union passed from stage to stage
//! - [`Message`] and [`Role`]: chat messages for LLM-backed stages
//! - [`Binding`]: shared state read or written by a stage

mod binding;
mod message;
mod value;

pub use binding::Binding;
pub use message::{Message, Role};
pub use value::{ControlSignal, Instruction, StageValue};
