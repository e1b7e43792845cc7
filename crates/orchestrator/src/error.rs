use thiserror::Error;
use uuid::Uuid;

use engine::EngineError;
use store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline definition cannot be run (no steps, gated first step).
    #[error("pipeline is not runnable: {0}")]
    PipelineUnavailable(String),
    #[error("agent {agent_id} is missing or inactive")]
    StepAgentUnavailable { agent_id: Uuid },
    #[error("an approval is already pending for this run")]
    GateAlreadyPending,
    #[error("no approval is pending for this run")]
    NoPendingApproval,
    #[error("unknown run")]
    UnknownRun,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
