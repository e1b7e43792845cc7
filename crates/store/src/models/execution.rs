use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status vocabulary shared by execution, pipeline-run, and step records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Running,
    AwaitingApproval,
    Completed,
    Error,
    Canceled,
    Rejected,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Running => write!(f, "running"),
            RecordStatus::AwaitingApproval => write!(f, "awaiting_approval"),
            RecordStatus::Completed => write!(f, "completed"),
            RecordStatus::Error => write!(f, "error"),
            RecordStatus::Canceled => write!(f, "canceled"),
            RecordStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::Running | RecordStatus::AwaitingApproval)
    }
}

/// Persistent record of one direct engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub task_id: Uuid,
    pub status: RecordStatus,
    pub session_id: Option<String>,
    pub result: Option<String>,
    pub cost_usd: f64,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn running(id: Uuid, agent_id: Uuid, task_id: Uuid) -> Self {
        Self {
            id,
            agent_id,
            task_id,
            status: RecordStatus::Running,
            session_id: None,
            result: None,
            cost_usd: 0.0,
            num_turns: 0,
            duration_ms: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Persistent record of one pipeline run. Totals are written back after
/// every completed step so a crash mid-run loses at most the in-flight
/// step's partial state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunRecord {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: RecordStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub total_cost_usd: f64,
    pub total_duration_ms: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRunRecord {
    pub fn running(id: Uuid, pipeline_id: Uuid, total_steps: usize) -> Self {
        Self {
            id,
            pipeline_id,
            status: RecordStatus::Running,
            current_step: 0,
            total_steps,
            total_cost_usd: 0.0,
            total_duration_ms: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Persistent record of one pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_index: usize,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub status: RecordStatus,
    pub result: Option<String>,
    pub cost_usd: f64,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn running(run_id: Uuid, step_index: usize, agent_id: Uuid, agent_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            step_index,
            agent_id,
            agent_name: agent_name.to_string(),
            status: RecordStatus::Running,
            result: None,
            cost_usd: 0.0,
            num_turns: 0,
            duration_ms: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Summary of a completed step, carried in the pipeline's terminal event
/// and handed to the report generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub agent_name: String,
    pub result: String,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub num_turns: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!RecordStatus::Running.is_terminal());
        assert!(!RecordStatus::AwaitingApproval.is_terminal());
        assert!(RecordStatus::Completed.is_terminal());
        assert!(RecordStatus::Error.is_terminal());
        assert!(RecordStatus::Canceled.is_terminal());
        assert!(RecordStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_display_matches_serde_rename() {
        assert_eq!(RecordStatus::AwaitingApproval.to_string(), "awaiting_approval");
        let json = serde_json::to_string(&RecordStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
    }
}
