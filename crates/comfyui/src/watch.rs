//! Push-based completion watcher.
//!
//! Reads frames from a ComfyUI WebSocket until the server reports that a
//! given prompt finished (`executing` with `node: null`, or
//! `execution_success`) or failed (`execution_error`). Messages for
//! other prompts and kinds we do not model are skipped.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::GenerationError;
use crate::messages::{parse_message, ServerMessage};

/// Wait on `stream` until `prompt_id` completes, bounded by `max_wait`.
pub async fn wait_for_completion<S>(
    stream: &mut S,
    prompt_id: &str,
    max_wait: Duration,
) -> Result<(), GenerationError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let started = Instant::now();
    match tokio::time::timeout(max_wait, watch(stream, prompt_id)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::PollTimeout {
            prompt_id: prompt_id.to_string(),
            elapsed: started.elapsed(),
        }),
    }
}

async fn watch<S>(stream: &mut S, prompt_id: &str) -> Result<(), GenerationError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let channel_error = |reason: String| GenerationError::PushChannel {
        prompt_id: prompt_id.to_string(),
        reason,
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(result) = handle_text(&text, prompt_id) {
                    return result;
                }
            }
            Ok(Message::Binary(_)) => {
                // Preview images.
                tracing::trace!(prompt_id, "Ignoring binary frame");
            }
            Ok(Message::Close(frame)) => {
                return Err(channel_error(format!("closed by server: {frame:?}")));
            }
            Ok(_) => {}
            Err(e) => return Err(channel_error(e.to_string())),
        }
    }

    Err(channel_error("stream ended".to_string()))
}

/// `Some` once the frame settles the outcome for `prompt_id`.
fn handle_text(text: &str, prompt_id: &str) -> Option<Result<(), GenerationError>> {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::trace!(error = %e, "Skipping unrecognised push message");
            return None;
        }
    };

    if msg.is_completion_of(prompt_id) {
        tracing::info!(prompt_id, "Push channel reported completion");
        return Some(Ok(()));
    }

    match msg {
        ServerMessage::ExecutionError(data) if data.prompt_id == prompt_id => {
            tracing::error!(
                prompt_id,
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
            Some(Err(GenerationError::ExecutionFailed {
                prompt_id: prompt_id.to_string(),
                node_id: data.node_id,
                message: data.exception_message,
            }))
        }
        ServerMessage::Progress(data) => {
            tracing::debug!(prompt_id, value = data.value, max = data.max, "Progress");
            None
        }
        ServerMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
            None
        }
        _ => None,
    }
}
