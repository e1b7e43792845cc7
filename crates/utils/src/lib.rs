//! Shared helpers used by the execution engine and the pipeline
//! orchestrator: bounded event history, child-environment assembly, and
//! text truncation for previews.

pub mod env;
pub mod event_buffer;
pub mod text;
