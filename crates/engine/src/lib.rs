//! Subprocess execution engine for a headless reasoning CLI.
//!
//! Spawns one subprocess per task in print mode with streamed JSON output,
//! classifies the stream into typed events, and manages admission control,
//! timeouts, and cancellation over the whole process group.

mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod stream;

pub use config::{AgentConfig, EngineConfig, WorkdirPolicy};
pub use engine::{ActiveRun, ExecuteRequest, ExecutionEngine, ResumeRequest};
pub use error::{EngineError, RunError};
pub use events::{OutputEvent, ResultMetadata, RunCompletion, RunEvent};
