//! Declarative construction of stage lists.

use super::{LinearFlow, LoopDecision, LoopedFlow};
use crate::core::StageValue;
use crate::stages::{Stage, StageRef};
use std::sync::Arc;

/// Collects stages for a [`LinearFlow`] or [`LoopedFlow`].
///
/// Conditional entries that are switched off contribute no stage at all.
#[derive(Default)]
pub struct FlowBuilder {
    stages: Vec<StageRef>,
}

impl FlowBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn shared(mut self, stage: StageRef) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends the stage made by `make` only when `condition` holds.
    #[must_use]
    pub fn stage_if<S, F>(self, condition: bool, make: F) -> Self
    where
        S: Stage + 'static,
        F: FnOnce() -> S,
    {
        if condition {
            self.stage(make())
        } else {
            self
        }
    }

    /// Appends the stage if there is one.
    #[must_use]
    pub fn maybe_stage<S: Stage + 'static>(self, stage: Option<S>) -> Self {
        match stage {
            Some(stage) => self.stage(stage),
            None => self,
        }
    }

    /// Appends every stage from `stages`, in order.
    #[must_use]
    pub fn stages<I>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = StageRef>,
    {
        self.stages.extend(stages);
        self
    }

    /// Returns the number of collected stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Builds a linear flow.
    pub fn build_linear(self, name: impl Into<String>) -> LinearFlow {
        LinearFlow::new(name, self.stages)
    }

    /// Builds a looped flow with the given decision function.
    pub fn build_looped<F>(self, name: impl Into<String>, decide: F) -> LoopedFlow
    where
        F: Fn(&StageValue) -> LoopDecision + Send + Sync + 'static,
    {
        LoopedFlow::new(name, self.stages).with_decision(decide)
    }
}

impl std::fmt::Debug for FlowBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowBuilder")
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticStage;

    #[test]
    fn test_conditional_entries() {
        let builder = FlowBuilder::new()
            .stage(StaticStage::new("a", StageValue::None))
            .stage_if(false, || StaticStage::new("skipped", StageValue::None))
            .stage_if(true, || StaticStage::new("b", StageValue::None))
            .maybe_stage(None::<StaticStage>)
            .maybe_stage(Some(StaticStage::new("c", StageValue::None)));

        assert_eq!(builder.len(), 3);
        let flow = builder.build_linear("built");
        let names: Vec<_> = flow.stages().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_all_disabled_builds_empty_flow() {
        let flow = FlowBuilder::new()
            .stage_if(false, || StaticStage::new("x", StageValue::None))
            .build_linear("empty");
        assert!(flow.is_empty());
    }

    #[tokio::test]
    async fn test_build_looped() {
        let flow = FlowBuilder::new()
            .stage(StaticStage::new("a", StageValue::text("out")))
            .build_looped("loop", |_| LoopDecision::Stop);
        assert_eq!(flow.execute(None).await.unwrap(), StageValue::text("out"));
    }
}
