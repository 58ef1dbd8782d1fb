//! Re-running a stage sequence until a decision function says stop.

use super::linear::{observe_flow, run_sequence};
use crate::core::{ControlSignal, StageValue};
use crate::errors::FlowError;
use crate::events::{noop_sink, EventSink};
use crate::stages::{Stage, StageRef};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What a looped flow does after an iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopDecision {
    /// Return the last output.
    Stop,
    /// Run again with this input.
    Proceed(Option<StageValue>),
}

/// Decision function applied to each iteration's output.
pub type DecisionFn = Arc<dyn Fn(&StageValue) -> LoopDecision + Send + Sync>;

/// A stage sequence re-executed until its decision function returns
/// [`LoopDecision::Stop`].
///
/// There is no iteration cap unless [`LoopedFlow::with_max_iterations`] is
/// used; a decision function that always proceeds runs forever.
#[derive(Clone)]
pub struct LoopedFlow {
    name: String,
    stages: Vec<StageRef>,
    decide: DecisionFn,
    max_iterations: Option<usize>,
    events: Arc<dyn EventSink>,
}

impl LoopedFlow {
    /// Creates a looped flow that stops after one iteration.
    pub fn new(name: impl Into<String>, stages: Vec<StageRef>) -> Self {
        Self {
            name: name.into(),
            stages,
            decide: Arc::new(|_: &StageValue| LoopDecision::Stop),
            max_iterations: None,
            events: noop_sink(),
        }
    }

    /// Sets the decision function.
    #[must_use]
    pub fn with_decision<F>(mut self, decide: F) -> Self
    where
        F: Fn(&StageValue) -> LoopDecision + Send + Sync + 'static,
    {
        self.decide = Arc::new(decide);
        self
    }

    /// Fails with [`FlowError::MaxIterationsExceeded`] once the sequence has
    /// run `limit` times without a stop.
    #[must_use]
    pub const fn with_max_iterations(mut self, limit: usize) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl fmt::Debug for LoopedFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopedFlow")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for LoopedFlow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let mut started = Map::new();
        started.insert("stages".into(), json!(self.stages.len()));
        if let Some(limit) = self.max_iterations {
            started.insert("max_iterations".into(), json!(limit));
        }
        observe_flow(&self.name, self.events.as_ref(), started, self.run_loop(input)).await
    }
}

impl LoopedFlow {
    async fn run_loop(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let mut next_input = input;
        let mut iteration = 0usize;
        loop {
            if let Some(limit) = self.max_iterations {
                if iteration >= limit {
                    return Err(FlowError::MaxIterationsExceeded {
                        flow: self.name.clone(),
                        limit,
                    });
                }
            }
            iteration += 1;
            self.events.try_emit(
                "loop.iteration",
                Some(json!({ "flow": self.name, "iteration": iteration })),
            );

            let output =
                run_sequence(&self.name, &self.stages, next_input.take(), self.events.as_ref())
                    .await?;

            match (self.decide)(&output) {
                LoopDecision::Stop => {
                    debug!(flow = %self.name, iterations = iteration, "loop stopped");
                    return Ok(output);
                }
                LoopDecision::Proceed(input) => next_input = input,
            }
        }
    }
}

/// Builds the usual conversational decision function.
///
/// When the output is an instruction to continue, `read_input` is asked for
/// one more line; the next iteration gets the instruction text followed by
/// that line. An end instruction, any other value, or no further input
/// stops the loop.
pub fn continue_while_instructed<R>(read_input: R) -> impl Fn(&StageValue) -> LoopDecision
where
    R: Fn() -> Option<String> + Send + Sync,
{
    move |output: &StageValue| match output.instruction() {
        Some(instruction) if instruction.control == ControlSignal::Continue => {
            match read_input() {
                Some(line) => LoopDecision::Proceed(Some(StageValue::Text(format!(
                    "{}\n{line}",
                    instruction.text
                )))),
                None => LoopDecision::Stop,
            }
        }
        _ => LoopDecision::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Instruction;
    use crate::events::CollectingEventSink;
    use crate::testing::{FailingStage, RecordingStage, ScriptedStage, StaticStage};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_stop_first_runs_once() {
        let stage = Arc::new(RecordingStage::new("body", StageValue::text("out")));
        let flow = LoopedFlow::new("once", vec![stage.clone()]);

        let output = flow.execute(Some(StageValue::text("in"))).await.unwrap();

        assert_eq!(output, StageValue::text("out"));
        assert_eq!(stage.call_count(), 1);
    }

    #[tokio::test]
    async fn test_proceed_n_times_runs_n_plus_one() {
        let stage = Arc::new(RecordingStage::new("body", StageValue::text("out")));
        let decisions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&decisions);
        let flow = LoopedFlow::new("thrice", vec![stage.clone()]).with_decision(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                LoopDecision::Proceed(Some(StageValue::text("again")))
            } else {
                LoopDecision::Stop
            }
        });

        flow.execute(None).await.unwrap();

        assert_eq!(stage.call_count(), 4);
        let inputs = stage.inputs();
        assert_eq!(inputs[0], None);
        assert_eq!(inputs[3], Some(StageValue::text("again")));
    }

    #[tokio::test]
    async fn test_proceed_with_absent_input() {
        let stage = Arc::new(RecordingStage::new("body", StageValue::text("out")));
        let first = Arc::new(AtomicUsize::new(0));
        let flow = LoopedFlow::new("absent", vec![stage.clone()]).with_decision(move |_| {
            if first.fetch_add(1, Ordering::SeqCst) == 0 {
                LoopDecision::Proceed(None)
            } else {
                LoopDecision::Stop
            }
        });

        flow.execute(Some(StageValue::text("seed"))).await.unwrap();

        assert_eq!(stage.inputs(), vec![Some(StageValue::text("seed")), None]);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let stage = Arc::new(RecordingStage::new("body", StageValue::None));
        let flow = LoopedFlow::new("forever", vec![stage.clone()])
            .with_decision(|_| LoopDecision::Proceed(None))
            .with_max_iterations(5);

        let err = flow.execute(None).await.unwrap_err();

        assert!(matches!(err, FlowError::MaxIterationsExceeded { limit: 5, .. }));
        assert_eq!(stage.call_count(), 5);
    }

    #[tokio::test]
    async fn test_lifecycle_events_bracket_iterations() {
        let sink = Arc::new(CollectingEventSink::new());
        let decisions = Arc::new(AtomicUsize::new(0));
        let flow = LoopedFlow::new("twice", vec![Arc::new(StaticStage::new("a", StageValue::None))])
            .with_decision(move |_| {
                if decisions.fetch_add(1, Ordering::SeqCst) == 0 {
                    LoopDecision::Proceed(None)
                } else {
                    LoopDecision::Stop
                }
            })
            .with_event_sink(sink.clone());

        flow.execute(None).await.unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                "flow.started",
                "loop.iteration",
                "stage.started",
                "stage.completed",
                "loop.iteration",
                "stage.started",
                "stage.completed",
                "flow.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_iteration_cap_reports_flow_failed() {
        let sink = Arc::new(CollectingEventSink::new());
        let flow = LoopedFlow::new("capped", Vec::new())
            .with_decision(|_| LoopDecision::Proceed(None))
            .with_max_iterations(1)
            .with_event_sink(sink.clone());

        assert!(flow.execute(None).await.is_err());

        assert_eq!(sink.event_types().last().map(String::as_str), Some("flow.failed"));
    }

    #[tokio::test]
    async fn test_failure_aborts_loop() {
        let flow = LoopedFlow::new("failing", vec![Arc::new(FailingStage::new("bad", "x"))])
            .with_decision(|_| LoopDecision::Proceed(None));
        assert!(flow.execute(None).await.is_err());
    }

    #[tokio::test]
    async fn test_continue_while_instructed() {
        let agent = Arc::new(ScriptedStage::new(
            "agent",
            vec![
                Instruction::proceed("what next?").into(),
                Instruction::end("bye").into(),
            ],
        ));
        let lines = Mutex::new(vec!["tell me more".to_string()]);
        let flow = LoopedFlow::new("chat", vec![agent.clone()])
            .with_decision(continue_while_instructed(move || lines.lock().pop()));

        let output = flow.execute(Some(StageValue::text("hi"))).await.unwrap();

        assert_eq!(output, StageValue::from(Instruction::end("bye")));
        assert_eq!(
            agent.inputs()[1],
            Some(StageValue::text("what next?\ntell me more"))
        );
    }
}
