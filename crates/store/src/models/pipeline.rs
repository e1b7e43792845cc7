use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stage of a pipeline, bound to a specific agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub agent_id: Uuid,
    /// Template for the step's input. Every `{{input}}` is replaced with
    /// the previous step's output; an empty or absent template passes the
    /// previous output through unchanged.
    pub input_template: Option<String>,
    /// Gated steps suspend the run until an external approve/reject
    /// decision arrives. The first step can never be gated.
    pub requires_approval: bool,
}

impl PipelineStep {
    pub fn new(agent_id: Uuid) -> Self {
        Self {
            agent_id,
            input_template: None,
            requires_approval: false,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.input_template = Some(template.into());
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// Ordered list of steps executed strictly one at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<PipelineStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRecord {
    pub fn new(name: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
            created_at: now,
            updated_at: now,
        }
    }
}
