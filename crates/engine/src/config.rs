//! Engine-wide and per-run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MIN_CONCURRENT: usize = 1;
pub const MAX_CONCURRENT: usize = 20;
const DEFAULT_CONCURRENT: usize = 5;

/// Immutable per-run snapshot of an agent's execution settings. Built by
/// the caller from the stored agent record; changes to that record never
/// affect a run already in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub working_dir: PathBuf,
    pub max_turns: Option<u32>,
    pub allowed_tools: Vec<String>,
    pub permission_mode: Option<String>,
    /// Overrides the engine's default run timeout when set.
    pub timeout_secs: Option<u64>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            model: None,
            system_prompt: None,
            working_dir: working_dir.into(),
            max_turns: None,
            allowed_tools: Vec::new(),
            permission_mode: None,
            timeout_secs: None,
        }
    }
}

/// Policy applied to a run's working directory before anything is spawned.
/// An empty root list admits any absolute path; relative paths are always
/// refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkdirPolicy {
    pub allowed_roots: Vec<PathBuf>,
    pub create_missing: bool,
}

impl Default for WorkdirPolicy {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            create_missing: true,
        }
    }
}

impl WorkdirPolicy {
    /// Validates the directory and creates it when missing and allowed.
    /// Returns the rejection reason on failure.
    pub fn prepare(&self, path: &Path) -> Result<(), String> {
        if !path.is_absolute() {
            return Err(format!(
                "working directory must be absolute, got {}",
                path.display()
            ));
        }
        if !self.allowed_roots.is_empty()
            && !self.allowed_roots.iter().any(|root| path.starts_with(root))
        {
            return Err(format!("{} is outside the allowed roots", path.display()));
        }
        if !path.exists() {
            if !self.create_missing {
                return Err(format!("{} does not exist", path.display()));
            }
            std::fs::create_dir_all(path)
                .map_err(|e| format!("could not create {}: {e}", path.display()))?;
        }
        Ok(())
    }
}

/// Configuration for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global admission ceiling, clamped to [1, 20].
    pub max_concurrent: usize,
    /// Run timeout applied when the agent does not set its own.
    pub default_timeout_secs: u64,
    /// Window between the graceful terminate signal and the forced kill.
    pub kill_grace_ms: u64,
    /// Per-run replay buffer size in events, oldest evicted first.
    pub event_buffer_capacity: usize,
    /// Byte ceiling for the aggregated result text.
    pub result_byte_cap: usize,
    /// Byte ceiling for captured stderr.
    pub stderr_byte_cap: usize,
    /// Engine binary to invoke.
    pub binary: String,
    pub workdir: WorkdirPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_CONCURRENT,
            default_timeout_secs: 600,
            kill_grace_ms: 5_000,
            event_buffer_capacity: 1_000,
            result_byte_cap: 512 * 1024,
            stderr_byte_cap: 64 * 1024,
            binary: "claude".to_string(),
            workdir: WorkdirPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.clamp(MIN_CONCURRENT, MAX_CONCURRENT);
        self
    }

    pub fn with_default_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn with_kill_grace_ms(mut self, ms: u64) -> Self {
        self.kill_grace_ms = ms;
        self
    }

    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_workdir(mut self, workdir: WorkdirPolicy) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}
