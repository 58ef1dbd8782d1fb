//! Observability setup for processes embedding flows.
//!
//! Library code only emits `tracing` events and [`crate::events`]; installing
//! a subscriber is left to the entry point, through [`LoggingConfig`].

mod logging;

pub use logging::{LoggingConfig, DEFAULT_FILTER};
