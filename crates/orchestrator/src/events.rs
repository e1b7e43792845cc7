//! Events delivered on a pipeline run's channel.

use serde::{Deserialize, Serialize};

use engine::OutputEvent;
use store::models::StepResult;

/// Item on the per-run pipeline channel. `Complete`, `Error`, and
/// `Rejected` are terminal; a canceled run closes the channel without a
/// terminal item. Previews are truncated so lifecycle events never relay
/// unbounded step output; full text still flows through `StepOutput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StepStart {
        step_index: usize,
        agent_name: String,
        total_steps: usize,
    },
    StepOutput {
        step_index: usize,
        event: OutputEvent,
    },
    StepComplete {
        step_index: usize,
        result_preview: String,
        cost_usd: f64,
    },
    ApprovalRequired {
        step_index: usize,
        agent_name: String,
        output_preview: String,
    },
    Rejected {
        step_index: usize,
    },
    Complete {
        results: Vec<StepResult>,
        total_cost_usd: f64,
    },
    Error {
        step_index: usize,
        message: String,
    },
    ReportGenerated {
        reference: String,
    },
}
