//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (prompt submission, history retrieval,
//! artifact download, queue inspection, interruption) using
//! [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use easel_core::JobSpec;
use serde::Deserialize;

use crate::backend::RenderBackend;
use crate::history::{History, ImageRef};

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after queuing a
/// workflow. Nothing downstream depends on its contents.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub node_errors: Option<serde_json::Value>,
}

/// Snapshot of `GET /queue`.
#[derive(Debug, Default, Deserialize)]
pub struct QueueStatus {
    #[serde(default)]
    pub queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    pub queue_pending: Vec<serde_json::Value>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ComfyUIApiError {
    /// Whether a retry could plausibly succeed (transport failure or 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            ComfyUIApiError::Request(_) => true,
            ComfyUIApiError::ApiError { status, .. } => *status >= 500,
            ComfyUIApiError::Decode(_) => false,
        }
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client with a per-request timeout.
    pub fn with_timeout(
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution under a caller-chosen `prompt_id`.
    ///
    /// Sends `POST /prompt` with `{prompt, client_id, prompt_id}`.
    pub async fn submit_prompt(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
        prompt_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
            "prompt_id": prompt_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The map is empty until
    /// the server has registered the prompt.
    pub async fn get_history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download one artifact's raw bytes via `GET /view`.
    pub async fn view_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Running and pending queue entries (`GET /queue`).
    pub async fn queue_status(&self) -> Result<QueueStatus, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Interrupt the currently running execution immediately.
    ///
    /// Sends a `POST /interrupt` request. This does not target a
    /// specific prompt -- it interrupts whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body. An empty body yields
    /// `T::default()`.
    async fn parse_response<T: serde::de::DeserializeOwned + Default>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RenderBackend for ComfyUIApi {
    async fn submit(
        &self,
        spec: &JobSpec,
        client_id: &str,
        prompt_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        self.submit_prompt(&spec.to_json(), client_id, prompt_id)
            .await
    }

    async fn history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }

    async fn view(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view_image(image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn submit_posts_prompt_with_ids() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/prompt").json_body(json!({
                "prompt": { "1": { "class_type": "SaveImage", "inputs": {} } },
                "client_id": "client-1",
                "prompt_id": "prompt-1"
            }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"prompt_id":"prompt-1","number":3,"node_errors":{}}"#);
        });

        let api = ComfyUIApi::new(server.base_url());
        let workflow = json!({ "1": { "class_type": "SaveImage", "inputs": {} } });
        let response = api
            .submit_prompt(&workflow, "client-1", "prompt-1")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.prompt_id.as_deref(), Some("prompt-1"));
        assert_eq!(response.number, Some(3));
    }

    #[tokio::test]
    async fn submit_surfaces_non_success_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/prompt");
            then.status(400).body(r#"{"error":"invalid prompt"}"#);
        });

        let api = ComfyUIApi::new(server.base_url());
        let result = api.submit_prompt(&json!({}), "c", "p").await;
        assert_matches!(
            result,
            Err(ComfyUIApiError::ApiError { status: 400, ref body }) if body.contains("invalid prompt")
        );
    }

    #[tokio::test]
    async fn submit_rejects_malformed_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/prompt");
            then.status(200).body("<html>oops</html>");
        });

        let api = ComfyUIApi::new(server.base_url());
        let result = api.submit_prompt(&json!({}), "c", "p").await;
        assert_matches!(result, Err(ComfyUIApiError::Decode(_)));
    }

    #[tokio::test]
    async fn history_parses_entries() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET").path("/history/abc");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"abc":{"outputs":{"9":{"images":[{"filename":"out.png","subfolder":"","type":"output"}]}}}}"#);
        });

        let api = ComfyUIApi::new(format!("{}/", server.base_url()));
        let history = api.get_history("abc").await.unwrap();

        mock.assert();
        assert!(history["abc"].is_complete());
    }

    #[tokio::test]
    async fn history_empty_object_means_unregistered() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/history/abc");
            then.status(200).body("{}");
        });

        let api = ComfyUIApi::new(server.base_url());
        assert!(api.get_history("abc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn view_sends_descriptor_as_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/view")
                .query_param("filename", "out_1.png")
                .query_param("subfolder", "batch")
                .query_param("type", "output");
            then.status(200).body(b"\x89PNG-bytes".to_vec());
        });

        let api = ComfyUIApi::new(server.base_url());
        let image = ImageRef {
            filename: "out_1.png".into(),
            subfolder: "batch".into(),
            kind: "output".into(),
        };
        let bytes = api.view_image(&image).await.unwrap();

        mock.assert();
        assert_eq!(bytes, b"\x89PNG-bytes".to_vec());
    }

    #[tokio::test]
    async fn view_not_found_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/view");
            then.status(404);
        });

        let api = ComfyUIApi::new(server.base_url());
        let image = ImageRef {
            filename: "gone.png".into(),
            subfolder: String::new(),
            kind: "output".into(),
        };
        let err = api.view_image(&image).await.unwrap_err();
        assert_matches!(err, ComfyUIApiError::ApiError { status: 404, .. });
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn queue_status_counts_entries() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/queue");
            then.status(200)
                .body(r#"{"queue_running":[[0,"a",{}]],"queue_pending":[[1,"b",{}],[2,"c",{}]]}"#);
        });

        let api = ComfyUIApi::new(server.base_url());
        let status = api.queue_status().await.unwrap();
        assert_eq!(status.queue_running.len(), 1);
        assert_eq!(status.queue_pending.len(), 2);
    }

    #[tokio::test]
    async fn interrupt_posts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/interrupt");
            then.status(200);
        });

        ComfyUIApi::new(server.base_url()).interrupt().await.unwrap();
        mock.assert();
    }

    #[test]
    fn server_errors_are_transient() {
        let err = ComfyUIApiError::ApiError {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
    }
}
