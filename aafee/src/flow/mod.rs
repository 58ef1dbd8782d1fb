//! Flow composition.
//!
//! - [`LinearFlow`]: stages in order, each fed the previous output
//! - [`LoopedFlow`]: a stage sequence re-run until a decision function stops it
//! - [`RepeatUntilCondition`]: a subflow re-run while an external flag is set
//! - [`FlowBuilder`]: declarative stage lists with conditional entries

mod builder;
mod linear;
mod looped;
mod repeat;

pub use builder::FlowBuilder;
pub use linear::LinearFlow;
pub use looped::{continue_while_instructed, DecisionFn, LoopDecision, LoopedFlow};
pub use repeat::RepeatUntilCondition;
