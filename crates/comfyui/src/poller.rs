//! Completion detection by polling `/history/{prompt_id}`.
//!
//! A prompt counts as finished once its output manifest is non-empty and
//! at least one node lists produced images. A prompt id missing from the
//! history response is simply not registered yet and keeps the loop
//! going. The deadline is measured from the first attempt.

use std::time::Duration;

use tokio::time::Instant;

use crate::backend::RenderBackend;
use crate::error::GenerationError;
use crate::history::HistoryEntry;
use crate::retry::{retry_transient_until, RetryConfig};

/// Polling cadence and overall deadline.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between history queries.
    pub interval: Duration,
    /// Give up once this much time has passed since the first query.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// Poll until `prompt_id` reports produced artifacts or `max_wait` elapses.
///
/// Returns the completed history record. The sleep before the next query
/// never runs past the deadline, so a timeout is reported within one
/// request latency of `max_wait`.
pub async fn wait_until_done<B: RenderBackend + ?Sized>(
    backend: &B,
    prompt_id: &str,
    poll: &PollConfig,
    retry: &RetryConfig,
) -> Result<HistoryEntry, GenerationError> {
    let started = Instant::now();
    // `None` when `max_wait` is too large to represent: wait indefinitely.
    let deadline = started.checked_add(poll.max_wait);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let mut history =
            retry_transient_until(retry, "history", deadline, || backend.history(prompt_id))
                .await
            .map_err(|source| GenerationError::Transport {
                prompt_id: prompt_id.to_string(),
                source,
            })?;

        match history.remove(prompt_id) {
            Some(entry) if entry.is_complete() => {
                tracing::info!(
                    prompt_id,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    artifacts = entry.artifact_count(),
                    status = ?entry.status.as_ref().and_then(|s| s.status_str.as_deref()),
                    "Prompt completed",
                );
                return Ok(entry);
            }
            Some(entry) => {
                tracing::debug!(
                    prompt_id,
                    attempt,
                    nodes = entry.outputs.len(),
                    "Prompt registered, no artifacts yet",
                );
            }
            None => {
                tracing::debug!(prompt_id, attempt, "Prompt not in history yet");
            }
        }

        let now = Instant::now();
        let Some(deadline) = deadline else {
            tokio::time::sleep(poll.interval).await;
            continue;
        };
        if now >= deadline {
            let elapsed = now - started;
            tracing::warn!(
                prompt_id,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "Timed out waiting for prompt",
            );
            return Err(GenerationError::PollTimeout {
                prompt_id: prompt_id.to_string(),
                elapsed,
            });
        }

        tokio::time::sleep(poll.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use easel_core::JobSpec;

    use crate::api::{ComfyUIApiError, SubmitResponse};
    use crate::history::{History, ImageRef};

    /// Serves scripted history responses, repeating the last one.
    struct ScriptedHistory {
        responses: Mutex<VecDeque<Result<History, ComfyUIApiError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedHistory {
        fn new(responses: Vec<Result<History, ComfyUIApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl RenderBackend for ScriptedHistory {
        async fn submit(
            &self,
            _spec: &JobSpec,
            _client_id: &str,
            _prompt_id: &str,
        ) -> Result<SubmitResponse, ComfyUIApiError> {
            Ok(SubmitResponse::default())
        }

        async fn history(&self, _prompt_id: &str) -> Result<History, ComfyUIApiError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                match responses.front().unwrap() {
                    Ok(h) => Ok(h.clone()),
                    Err(_) => Err(ComfyUIApiError::ApiError {
                        status: 500,
                        body: String::new(),
                    }),
                }
            }
        }

        async fn view(&self, _image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
            Ok(Vec::new())
        }
    }

    fn history(json: &str) -> History {
        serde_json::from_str(json).unwrap()
    }

    fn config(interval_secs: u64, max_wait_secs: u64) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(interval_secs),
            max_wait: Duration::from_secs(max_wait_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_max_wait_when_never_registered() {
        let backend = ScriptedHistory::new(vec![Ok(History::new())]);
        let started = Instant::now();

        let result =
            wait_until_done(&backend, "p1", &config(1, 2), &RetryConfig::default()).await;

        let elapsed = started.elapsed();
        assert_matches!(
            result,
            Err(GenerationError::PollTimeout { prompt_id, .. }) if prompt_id == "p1"
        );
        assert!(elapsed >= Duration::from_secs(2), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "returned late: {elapsed:?}");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn last_sleep_is_clamped_to_deadline() {
        let backend = ScriptedHistory::new(vec![Ok(History::new())]);
        let started = Instant::now();

        let result =
            wait_until_done(&backend, "p1", &config(3, 5), &RetryConfig::default()).await;

        let elapsed = started.elapsed();
        assert_matches!(result, Err(GenerationError::PollTimeout { .. }));
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5_100), "overshot deadline: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn registered_without_artifacts_keeps_polling() {
        let backend = ScriptedHistory::new(vec![
            Ok(History::new()),
            Ok(history(r#"{"p1":{"outputs":{}}}"#)),
            Ok(history(r#"{"p1":{"outputs":{"9":{"images":[]}}}}"#)),
            Ok(history(
                r#"{"p1":{"outputs":{"9":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]}}}}"#,
            )),
        ]);

        let entry = wait_until_done(&backend, "p1", &config(1, 60), &RetryConfig::default())
            .await
            .unwrap();

        assert_eq!(entry.outputs["9"].images[0].filename, "a.png");
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_when_any_node_has_images() {
        let backend = ScriptedHistory::new(vec![Ok(history(
            r#"{"p1":{"outputs":{"9":{"images":[]},"20":{"images":[{"filename":"b.png","subfolder":"","type":"temp"}]}}}}"#,
        ))]);
        let started = Instant::now();

        let entry = wait_until_done(&backend, "p1", &config(1, 60), &RetryConfig::default())
            .await
            .unwrap();

        assert!(entry.outputs["9"].images.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_prompt_ids_are_ignored() {
        let backend = ScriptedHistory::new(vec![Ok(history(
            r#"{"other":{"outputs":{"9":{"images":[{"filename":"x.png","subfolder":"","type":"output"}]}}}}"#,
        ))]);

        let result =
            wait_until_done(&backend, "p1", &config(1, 1), &RetryConfig::default()).await;
        assert_matches!(result, Err(GenerationError::PollTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_surfaces_immediately() {
        let backend = ScriptedHistory::new(vec![Err(ComfyUIApiError::ApiError {
            status: 500,
            body: "boom".into(),
        })]);

        let result =
            wait_until_done(&backend, "p1", &config(1, 60), &RetryConfig::default()).await;

        assert_matches!(
            result,
            Err(GenerationError::Transport { prompt_id, .. }) if prompt_id == "p1"
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_is_retried_when_configured() {
        let backend = ScriptedHistory::new(vec![
            Err(ComfyUIApiError::ApiError {
                status: 503,
                body: String::new(),
            }),
            Ok(history(
                r#"{"p1":{"outputs":{"9":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]}}}}"#,
            )),
        ]);

        let entry = wait_until_done(&backend, "p1", &config(1, 60), &RetryConfig::with_attempts(2))
            .await
            .unwrap();

        assert!(entry.is_complete());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_max_wait_means_no_deadline() {
        let backend = ScriptedHistory::new(vec![
            Ok(History::new()),
            Ok(history(
                r#"{"p1":{"outputs":{"9":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]}}}}"#,
            )),
        ]);
        let poll = PollConfig {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(u64::MAX),
        };

        let entry = wait_until_done(&backend, "p1", &poll, &RetryConfig::default())
            .await
            .unwrap();

        assert!(entry.is_complete());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backoff_does_not_outlive_max_wait() {
        let backend = ScriptedHistory::new(vec![Err(ComfyUIApiError::ApiError {
            status: 502,
            body: String::new(),
        })]);
        let started = Instant::now();

        let result =
            wait_until_done(&backend, "p1", &config(1, 2), &RetryConfig::with_attempts(10)).await;

        assert_matches!(result, Err(GenerationError::Transport { .. }));
        assert!(started.elapsed() <= Duration::from_secs(2), "overran: {:?}", started.elapsed());
        assert_eq!(backend.calls(), 4);
    }
}
