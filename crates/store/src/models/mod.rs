pub mod agent;
pub mod execution;
pub mod pipeline;

pub use agent::{AgentRecord, AgentStatus};
pub use execution::{ExecutionRecord, PipelineRunRecord, RecordStatus, StepRecord, StepResult};
pub use pipeline::{PipelineRecord, PipelineStep};
