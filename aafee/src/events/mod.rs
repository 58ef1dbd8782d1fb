//! Telemetry sinks for flows and tool discovery.
//!
//! Event types are dotted names such as `stage.started`; payloads are
//! small JSON objects naming the flow, stage or server involved.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use std::sync::Arc;

/// Returns a shared no-op sink, the default for every component.
#[must_use]
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpEventSink)
}
