//! Test doubles for flows, agents and tool servers.
//!
//! This module provides:
//! - Scripted and recording stages
//! - A scripted model service
//! - In-memory tool servers
//! - Assertions on stage values

mod assertions;
mod mocks;
mod tools;

pub use assertions::{
    assert_continue, assert_end, assert_text, assert_text_contains, assert_variant,
};
pub use mocks::{FailingStage, RecordingStage, ScriptedLlm, ScriptedStage, StaticStage};
pub use tools::{FakeConnection, FakeLauncher};
