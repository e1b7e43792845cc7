use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Archived,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Inactive => write!(f, "inactive"),
            AgentStatus::Archived => write!(f, "archived"),
        }
    }
}

/// Agent definition as read from the durable store. Every run snapshots
/// these fields at spawn time; later edits to the record never affect a
/// run that is already in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub working_dir: PathBuf,
    pub max_turns: Option<u32>,
    pub allowed_tools: Vec<String>,
    pub permission_mode: Option<String>,
    /// Per-run subprocess timeout; the engine default applies when unset.
    pub timeout_secs: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: AgentStatus::Active,
            model: None,
            system_prompt: None,
            working_dir: working_dir.into(),
            max_turns: None,
            allowed_tools: Vec::new(),
            permission_mode: None,
            timeout_secs: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Only active agents may be executed; inactive and archived records
    /// are kept for history but refuse new runs.
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
