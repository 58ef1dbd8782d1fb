//! Sequential execution of a stage list.

use crate::core::StageValue;
use crate::errors::FlowError;
use crate::events::{noop_sink, EventSink};
use crate::stages::{Stage, StageRef};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs `stages` in order, feeding each the previous output.
///
/// The first failure aborts the run. An empty list yields
/// [`StageValue::None`] whatever the input.
pub(crate) async fn run_sequence(
    flow: &str,
    stages: &[StageRef],
    input: Option<StageValue>,
    events: &dyn EventSink,
) -> Result<StageValue, FlowError> {
    if stages.is_empty() {
        return Ok(StageValue::None);
    }

    let mut output = input;
    for stage in stages {
        let stage_name = stage.name();
        events.try_emit("stage.started", Some(json!({ "flow": flow, "stage": stage_name })));
        debug!(flow, stage = stage_name, "stage started");

        let started = Instant::now();
        match stage.execute(output.take()).await {
            Ok(value) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                events.try_emit(
                    "stage.completed",
                    Some(json!({
                        "flow": flow,
                        "stage": stage_name,
                        "output": value.variant_name(),
                        "duration_ms": duration_ms,
                    })),
                );
                debug!(flow, stage = stage_name, output = value.variant_name(), "stage completed");
                output = Some(value);
            }
            Err(err) => {
                events.try_emit(
                    "stage.failed",
                    Some(json!({ "flow": flow, "stage": stage_name, "error": err.to_string() })),
                );
                debug!(flow, stage = stage_name, error = %err, "stage failed");
                return Err(err);
            }
        }
    }
    Ok(output.unwrap_or_default())
}

/// Brackets `body` with `flow.started` and `flow.completed` or
/// `flow.failed` events. Every flow kind reports its lifecycle this way.
pub(crate) async fn observe_flow<F>(
    flow: &str,
    events: &dyn EventSink,
    mut started: Map<String, Value>,
    body: F,
) -> Result<StageValue, FlowError>
where
    F: Future<Output = Result<StageValue, FlowError>>,
{
    started.insert("flow".into(), json!(flow));
    events.try_emit("flow.started", Some(Value::Object(started)));
    let started_at = Instant::now();

    let result = body.await;

    let duration_ms = started_at.elapsed().as_secs_f64() * 1000.0;
    match &result {
        Ok(_) => events.try_emit(
            "flow.completed",
            Some(json!({ "flow": flow, "duration_ms": duration_ms })),
        ),
        Err(err) => events.try_emit(
            "flow.failed",
            Some(json!({ "flow": flow, "error": err.to_string() })),
        ),
    }
    result
}

/// An ordered list of stages executed one after another.
///
/// A flow is itself a [`Stage`], so flows nest.
#[derive(Clone)]
pub struct LinearFlow {
    name: String,
    stages: Vec<StageRef>,
    events: Arc<dyn EventSink>,
}

impl LinearFlow {
    /// Creates a flow from a stage list.
    pub fn new(name: impl Into<String>, stages: Vec<StageRef>) -> Self {
        Self {
            name: name.into(),
            stages,
            events: noop_sink(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageRef] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the flow has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Creates a single-stage flow calling a function on an HTTP tool-server
    /// gateway.
    #[cfg(feature = "http")]
    pub fn with_mcp_server(
        server_name: impl Into<String>,
        function_name: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let stage = crate::stages::McpServerStage::new(server_name, function_name)
            .with_parameters(parameters);
        let name = stage.name().to_string();
        Self::new(name, vec![Arc::new(stage)])
    }
}

impl fmt::Debug for LinearFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearFlow")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for LinearFlow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        let mut started = Map::new();
        started.insert("stages".into(), json!(self.stages.len()));
        observe_flow(
            &self.name,
            self.events.as_ref(),
            started,
            run_sequence(&self.name, &self.stages, input, self.events.as_ref()),
        )
        .await
    }
}
