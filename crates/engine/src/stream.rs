//! Per-line classification of the engine's output stream.
//!
//! The subprocess emits one JSON record per line. Records are parsed into
//! typed [`OutputEvent`]s; a line that fails to parse degrades to a raw
//! `Chunk` event so one malformed line can never abort the stream. Unknown
//! record types are ignored.

use serde::Deserialize;
use serde_json::Value;
use workspace_utils::text::truncate;

use crate::events::{OutputEvent, ResultMetadata};

const TOOL_DETAIL_MAX_CHARS: usize = 100;

/// Input keys probed for a human-readable tool detail; first present wins.
const DETAIL_KEYS: &[&str] = &[
    "command",
    "file_path",
    "path",
    "pattern",
    "query",
    "url",
    "prompt",
    "description",
];

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(rename = "type")]
    record_type: String,
    subtype: Option<String>,
    session_id: Option<String>,
    /// Object for assistant records, arbitrary elsewhere.
    message: Option<Value>,
    error: Option<String>,
    result: Option<String>,
    is_error: Option<bool>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
    errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

/// Stateful classifier for one run's stdout. Tracks turn count, the
/// byte-capped result accumulator, the session id, and the terminal
/// result record.
pub(crate) struct StreamParser {
    result_byte_cap: usize,
    result_text: String,
    result_fallback: Option<String>,
    turns: u32,
    session_id: Option<String>,
    metadata: Option<ResultMetadata>,
}

impl StreamParser {
    pub fn new(result_byte_cap: usize) -> Self {
        Self {
            result_byte_cap,
            result_text: String::new(),
            result_fallback: None,
            turns: 0,
            session_id: None,
            metadata: None,
        }
    }

    /// Classifies one stdout line into zero or more events.
    pub fn parse_line(&mut self, line: &str) -> Vec<OutputEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let record: StreamRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(%err, "unparseable stream line, degrading to raw text");
                return vec![OutputEvent::Chunk {
                    text: trimmed.to_string(),
                }];
            }
        };

        match record.record_type.as_str() {
            "assistant" => self.classify_assistant(record),
            "system" => {
                if record.subtype.as_deref() == Some("init")
                    && let Some(session_id) = record.session_id
                {
                    self.session_id = Some(session_id);
                }
                let message = match (record.error, record.subtype) {
                    (Some(error), _) => error,
                    (None, Some(subtype)) => subtype,
                    (None, None) => "system".to_string(),
                };
                vec![OutputEvent::System { message }]
            }
            "result" => {
                self.metadata = Some(ResultMetadata {
                    cost_usd: record.total_cost_usd.unwrap_or(0.0),
                    duration_ms: record.duration_ms.unwrap_or(0),
                    num_turns: record.num_turns.unwrap_or(self.turns),
                    session_id: record.session_id.or_else(|| self.session_id.clone()),
                    is_error: record.is_error.unwrap_or(false),
                    errors: record.errors.unwrap_or_default(),
                });
                self.result_fallback = record.result;
                // the terminal record finalizes the run, it is not streamed
                Vec::new()
            }
            // "user" records are tool results echoed back; not surfaced
            _ => Vec::new(),
        }
    }

    fn classify_assistant(&mut self, record: StreamRecord) -> Vec<OutputEvent> {
        let Some(message) = record
            .message
            .and_then(|m| serde_json::from_value::<AssistantMessage>(m).ok())
        else {
            return Vec::new();
        };

        self.turns += 1;
        let mut events = vec![OutputEvent::Turn { index: self.turns }];

        for block in message.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(text) = block.text {
                        self.accumulate(&text);
                        events.push(OutputEvent::Chunk { text });
                    }
                }
                "tool_use" => {
                    let name = block.name.unwrap_or_else(|| "unknown".to_string());
                    let detail = block.input.as_ref().map(tool_detail).unwrap_or_default();
                    events.push(OutputEvent::Tool { name, detail });
                }
                _ => {}
            }
        }

        events
    }

    /// Appends assistant text up to the byte cap. Later chunks still emit
    /// events but stop growing the accumulator.
    fn accumulate(&mut self, text: &str) {
        let remaining = self.result_byte_cap.saturating_sub(self.result_text.len());
        if remaining == 0 {
            return;
        }
        if text.len() <= remaining {
            self.result_text.push_str(text);
        } else {
            let mut cut = remaining;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            self.result_text.push_str(&text[..cut]);
        }
    }

    /// Aggregated result text and captured terminal metadata.
    pub fn finish(self) -> (String, Option<ResultMetadata>) {
        let text = if self.result_text.is_empty() {
            self.result_fallback.unwrap_or_default()
        } else {
            self.result_text
        };
        (text, self.metadata)
    }
}

fn tool_detail(input: &Value) -> String {
    for key in DETAIL_KEYS {
        if let Some(value) = input.get(key).and_then(|v| v.as_str()) {
            return truncate(value, TOOL_DETAIL_MAX_CHARS);
        }
    }
    String::new()
}
