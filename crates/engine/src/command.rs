//! Argument construction for engine invocations.

use crate::config::AgentConfig;

/// Arguments for a fresh run: print mode with streamed JSON output so the
/// stream parser sees one record per line.
pub(crate) fn initial_args(agent: &AgentConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-p".into(),
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    if let Some(model) = &agent.model {
        args.push("--model".into());
        args.push(model.clone());
    }
    if let Some(max_turns) = agent.max_turns {
        args.push("--max-turns".into());
        args.push(max_turns.to_string());
    }
    if !agent.allowed_tools.is_empty() {
        args.push("--allowedTools".into());
        args.push(agent.allowed_tools.join(","));
    }
    match agent.permission_mode.as_deref() {
        Some("bypassPermissions") => args.push("--dangerously-skip-permissions".into()),
        Some(mode) => {
            args.push("--permission-mode".into());
            args.push(mode.to_string());
        }
        None => {}
    }
    if let Some(prompt) = &agent.system_prompt {
        args.push("--append-system-prompt".into());
        args.push(prompt.clone());
    }

    args
}

/// Arguments for continuing a prior session instead of fresh context.
pub(crate) fn resume_args(agent: &AgentConfig, session_id: &str) -> Vec<String> {
    let mut args = initial_args(agent);
    args.push("--resume".into());
    args.push(session_id.to_string());
    args
}
