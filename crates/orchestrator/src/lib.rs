//! Pipeline orchestration on top of the execution engine.
//!
//! Runs ordered lists of agent steps strictly one at a time, templating
//! each step's output into the next step's input, suspending before gated
//! steps until an approve/reject decision arrives, and aggregating cost
//! and duration per run. Direct single-agent runs go through
//! [`executions::ExecutionService`]; both compete for the engine's one
//! admission semaphore.

pub mod error;
pub mod events;
pub mod executions;
pub mod pipeline;
pub mod template;

use engine::AgentConfig;
use store::models::AgentRecord;

pub use error::PipelineError;
pub use events::PipelineEvent;
pub use executions::ExecutionService;
pub use pipeline::{ActivePipeline, PipelineService};

/// Per-run snapshot of a stored agent definition.
pub(crate) fn agent_config(record: &AgentRecord) -> AgentConfig {
    AgentConfig {
        name: record.name.clone(),
        model: record.model.clone(),
        system_prompt: record.system_prompt.clone(),
        working_dir: record.working_dir.clone(),
        max_turns: record.max_turns,
        allowed_tools: record.allowed_tools.clone(),
        permission_mode: record.permission_mode.clone(),
        timeout_secs: record.timeout_secs,
    }
}
