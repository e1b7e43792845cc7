//! Events delivered on a run's channel.

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Semantic event classified from the subprocess output stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// Assistant text.
    Chunk { text: String },
    /// Tool invocation; `detail` is a truncated human-readable summary of
    /// the tool's input (command, file path, pattern, ...).
    Tool { name: String, detail: String },
    /// Assistant message boundary; `index` counts from 1.
    Turn { index: u32 },
    /// Engine system or informational message.
    System { message: String },
    /// One non-empty line of subprocess stderr.
    Stderr { line: String },
}

/// Metadata from the engine's terminal result record. Captured when the
/// stream reports it, never streamed as an event itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetadata {
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub num_turns: u32,
    pub session_id: Option<String>,
    pub is_error: bool,
    pub errors: Vec<String>,
}

/// Terminal payload for a run whose process exited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletion {
    /// Aggregated assistant text, capped in bytes. Falls back to the
    /// result record's own text when nothing streamed.
    pub result: String,
    pub exit_code: Option<i32>,
    /// Captured stderr, capped in bytes.
    pub stderr: String,
    pub canceled: bool,
    /// A timeout surfaces as a normal close with partial output, flagged
    /// here rather than as a failure.
    pub timed_out: bool,
    pub metadata: Option<ResultMetadata>,
}

/// Item on the per-run event channel. The channel closes after a terminal
/// `Completed` or `Failed` item.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Output(OutputEvent),
    Completed(RunCompletion),
    Failed(RunError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = OutputEvent::Tool {
            name: "Bash".to_string(),
            detail: "ls -la".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool");
        assert_eq!(json["name"], "Bash");

        let turn = serde_json::to_value(OutputEvent::Turn { index: 2 }).unwrap();
        assert_eq!(turn["type"], "turn");
        assert_eq!(turn["index"], 2);
    }
}
