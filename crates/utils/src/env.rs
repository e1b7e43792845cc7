//! Child-process environment assembly.
//!
//! Spawned runs never inherit the parent environment wholesale: ambient
//! credentials (API keys, cloud tokens) must not leak into subprocess tool
//! calls. The child gets a small carried-over allow-list, forced home and
//! shell defaults, and the run's own secret bag merged last so explicit
//! secrets always win.

use std::collections::HashMap;
use std::path::Path;

/// Parent variables that are safe to carry into the child.
const CARRY_OVER: &[&str] = &["PATH", "LANG", "LC_ALL", "TZ", "TERM"];

const DEFAULT_SHELL: &str = "/bin/bash";

/// Builds the full environment for a spawned run. The caller passes the
/// run's working directory (which doubles as the child's `HOME`) and the
/// secret bag fetched from the store.
pub fn child_env(workdir: &Path, secrets: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for key in CARRY_OVER {
        if let Ok(value) = std::env::var(key) {
            env.insert((*key).to_string(), value);
        }
    }
    let carried = env.len();
    env.insert("HOME".to_string(), workdir.display().to_string());
    env.insert("SHELL".to_string(), DEFAULT_SHELL.to_string());
    for (key, value) in secrets {
        env.insert(key.clone(), value.clone());
    }
    tracing::debug!(carried, injected = secrets.len(), "assembled child environment");
    env
}
