use std::path::PathBuf;

use thiserror::Error;

/// Failures raised synchronously before any process is spawned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("admission rejected: {active} of {limit} runs active")]
    AdmissionRejected { active: usize, limit: usize },
    #[error("working directory invalid: {path}: {reason}")]
    DirectoryInvalid { path: PathBuf, reason: String },
    #[error("failed to spawn engine process: {0}")]
    SpawnFailure(#[from] std::io::Error),
}

/// In-flight failures, delivered as the run's terminal event.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// Abnormal exit with no usable result record.
    #[error("subprocess exited abnormally (code {exit_code:?}): {stderr_tail}")]
    SubprocessError {
        exit_code: Option<i32>,
        stderr_tail: String,
    },
    /// The engine's own terminal record reported a logical failure.
    #[error("engine reported failure: {message}")]
    ResultError { message: String },
}
