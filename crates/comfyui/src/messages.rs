//! ComfyUI push-channel message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes the
//! kinds relevant to completion tracking into a [`ServerMessage`].

use serde::Deserialize;

/// Known ComfyUI WebSocket message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Server status broadcast (queue depth).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(PromptRef),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A node is executing, or the prompt finished when `node` is `None`.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step progress from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// All nodes of a prompt finished (newer ComfyUI builds).
    #[serde(rename = "execution_success")]
    ExecutionSuccess(PromptRef),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueInfo {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload carrying only a prompt id.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i32,
    pub max: i32,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub prompt_id: String,
    /// Raw node output (images, text, ...).
    #[serde(default)]
    pub output: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

impl ServerMessage {
    /// The prompt this message is about, if it names one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Status(_) => None,
            ServerMessage::ExecutionStart(d) | ServerMessage::ExecutionSuccess(d) => {
                Some(&d.prompt_id)
            }
            ServerMessage::ExecutionCached(d) => Some(&d.prompt_id),
            ServerMessage::Executing(d) => d.prompt_id.as_deref(),
            ServerMessage::Progress(d) => d.prompt_id.as_deref(),
            ServerMessage::Executed(d) => Some(&d.prompt_id),
            ServerMessage::ExecutionError(d) => Some(&d.prompt_id),
        }
    }

    /// Whether this message signals that `prompt_id` finished executing.
    pub fn is_completion_of(&self, prompt_id: &str) -> bool {
        match self {
            ServerMessage::Executing(d) => {
                d.node.is_none() && d.prompt_id.as_deref() == Some(prompt_id)
            }
            ServerMessage::ExecutionSuccess(d) => d.prompt_id == prompt_id,
            _ => false,
        }
    }
}

/// Parse a ComfyUI WebSocket text frame.
///
/// Returns `Err` for malformed JSON or message kinds not modelled here
/// (callers log and continue).
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn executing_with_null_node_completes_matching_prompt() {
        let msg = parse_message(r#"{"type":"executing","data":{"node":null,"prompt_id":"xyz"}}"#)
            .unwrap();
        assert!(msg.is_completion_of("xyz"));
        assert!(!msg.is_completion_of("other"));
    }

    #[test]
    fn executing_with_node_is_not_completion() {
        let msg = parse_message(r#"{"type":"executing","data":{"node":"42","prompt_id":"xyz"}}"#)
            .unwrap();
        assert_matches!(&msg, ServerMessage::Executing(d) if d.node.as_deref() == Some("42"));
        assert!(!msg.is_completion_of("xyz"));
    }

    #[test]
    fn execution_success_completes() {
        let msg = parse_message(
            r#"{"type":"execution_success","data":{"prompt_id":"p","timestamp":1}}"#,
        )
        .unwrap();
        assert!(msg.is_completion_of("p"));
    }

    #[test]
    fn parse_status_message() {
        let msg = parse_message(
            r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}}}}"#,
        )
        .unwrap();
        assert_matches!(msg, ServerMessage::Status(d) if d.status.exec_info.queue_remaining == 3);
    }

    #[test]
    fn parse_progress_with_prompt() {
        let msg = parse_message(
            r#"{"type":"progress","data":{"value":5,"max":20,"prompt_id":"p","node":"3"}}"#,
        )
        .unwrap();
        assert_eq!(msg.prompt_id(), Some("p"));
        assert_matches!(msg, ServerMessage::Progress(d) if d.value == 5 && d.max == 20);
    }

    #[test]
    fn parse_execution_error_message() {
        let msg = parse_message(r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":"5","exception_message":"out of memory","exception_type":"RuntimeError"}}"#)
            .unwrap();
        assert_matches!(
            msg,
            ServerMessage::ExecutionError(d)
                if d.node_id == "5" && d.exception_message == "out of memory"
        );
    }

    #[test]
    fn parse_executed_message() {
        let msg = parse_message(r#"{"type":"executed","data":{"node":"9","output":{"images":[{"filename":"out.png"}]},"prompt_id":"abc"}}"#)
            .unwrap();
        assert_eq!(msg.prompt_id(), Some("abc"));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(parse_message(r#"{"type":"crystools.monitor","data":{}}"#).is_err());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_message("not json at all").is_err());
    }
}
