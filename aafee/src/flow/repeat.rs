//! Re-running a subflow while an external flag stays set.

use super::linear::observe_flow;
use crate::core::{Binding, StageValue};
use crate::errors::FlowError;
use crate::events::{noop_sink, EventSink};
use crate::stages::{Stage, StageRef};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs a subflow, then reads `condition`; repeats while it is `true`.
///
/// The subflow always gets the original input. The condition is read only
/// after a pass, so the subflow runs at least once. Some stage in the
/// subflow, or another party holding the binding, is expected to clear it.
#[derive(Clone)]
pub struct RepeatUntilCondition {
    name: String,
    subflow: StageRef,
    condition: Binding<bool>,
    events: Arc<dyn EventSink>,
}

impl RepeatUntilCondition {
    /// Creates a repeat loop over `subflow` guarded by `condition`.
    pub fn new(name: impl Into<String>, subflow: StageRef, condition: Binding<bool>) -> Self {
        Self {
            name: name.into(),
            subflow,
            condition,
            events: noop_sink(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    async fn run_passes(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let mut passes = 0usize;
        loop {
            let output = self.subflow.execute(input.clone()).await?;
            passes += 1;
            if !self.condition.get() {
                debug!(flow = %self.name, passes, "condition cleared");
                return Ok(output);
            }
        }
    }
}

impl fmt::Debug for RepeatUntilCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatUntilCondition")
            .field("name", &self.name)
            .field("subflow", &self.subflow.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for RepeatUntilCondition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let mut started = Map::new();
        started.insert("subflow".into(), json!(self.subflow.name()));
        observe_flow(&self.name, self.events.as_ref(), started, self.run_passes(input)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::stages::FnStage;
    use crate::testing::{FailingStage, RecordingStage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_until_binding_clears() {
        let keep_going = Binding::cell(true);
        let flag = keep_going.clone();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let body = Arc::new(FnStage::new("count", move |input: Option<StageValue>| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 3 {
                flag.set(false);
            }
            assert_eq!(input, Some(StageValue::text("same")));
            Ok(StageValue::Text(format!("pass {n}")))
        }));
        let flow = RepeatUntilCondition::new("repeat", body, keep_going);

        let output = flow.execute(Some(StageValue::text("same"))).await.unwrap();

        assert_eq!(output, StageValue::text("pass 3"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_false_condition_runs_once() {
        let body = Arc::new(RecordingStage::new("body", StageValue::text("x")));
        let flow = RepeatUntilCondition::new("once", body.clone(), Binding::constant(false));

        flow.execute(None).await.unwrap();

        assert_eq!(body.call_count(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let body = Arc::new(RecordingStage::new("body", StageValue::text("x")));
        let flow = RepeatUntilCondition::new("repeat", body, Binding::constant(false))
            .with_event_sink(sink.clone());

        flow.execute(None).await.unwrap();

        assert_eq!(sink.event_types(), vec!["flow.started", "flow.completed"]);
    }

    #[tokio::test]
    async fn test_subflow_failure_reports_flow_failed() {
        let sink = Arc::new(CollectingEventSink::new());
        let flow = RepeatUntilCondition::new(
            "repeat",
            Arc::new(FailingStage::new("bad", "boom")),
            Binding::constant(true),
        )
        .with_event_sink(sink.clone());

        assert!(flow.execute(None).await.is_err());

        assert_eq!(sink.event_types(), vec!["flow.started", "flow.failed"]);
    }
}
