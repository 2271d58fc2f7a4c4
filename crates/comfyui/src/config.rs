use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use easel_core::DEFAULT_WORKFLOW_NAME;

use crate::poller::PollConfig;
use crate::retry::RetryConfig;

/// How the generator learns that a prompt finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionStrategy {
    /// Poll `/history/{prompt_id}`.
    #[default]
    Poll,
    /// Wait for the WebSocket completion message, then read the manifest
    /// from history.
    Push,
}

impl FromStr for CompletionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "push" | "ws" | "websocket" => Ok(Self::Push),
            other => Err(format!("expected 'poll' or 'push', got '{other}'")),
        }
    }
}

/// Render-service configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI install.
#[derive(Debug, Clone)]
pub struct ComfyUIConfig {
    /// `host:port`, or a full `http(s)://` base URL.
    pub server_address: String,
    /// Directory holding the workflow template files.
    pub workflows_dir: PathBuf,
    /// Template used when a request does not name one.
    pub active_workflow: String,
    pub poll: PollConfig,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    pub retry: RetryConfig,
    pub completion: CompletionStrategy,
}

/// A configuration variable held a value we could not use.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl Default for ComfyUIConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:8188".into(),
            workflows_dir: PathBuf::from("workflows"),
            active_workflow: DEFAULT_WORKFLOW_NAME.into(),
            poll: PollConfig::default(),
            http_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
            completion: CompletionStrategy::Poll,
        }
    }
}

impl ComfyUIConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default          |
    /// |---------------------------|------------------|
    /// | `COMFY_SERVER_ADDRESS`    | `127.0.0.1:8188` |
    /// | `COMFY_WORKFLOWS_DIR`     | `workflows`      |
    /// | `COMFY_ACTIVE_WORKFLOW`   | `illustrious`    |
    /// | `COMFY_POLL_INTERVAL_MS`  | `1000`           |
    /// | `COMFY_MAX_WAIT_SECS`     | `600`            |
    /// | `COMFY_HTTP_TIMEOUT_SECS` | `120`            |
    /// | `COMFY_RETRY_ATTEMPTS`    | `1`              |
    /// | `COMFY_COMPLETION_MODE`   | `poll`           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        let interval_ms: u64 = parse_or(
            &get,
            "COMFY_POLL_INTERVAL_MS",
            defaults.poll.interval.as_millis() as u64,
        )?;
        if interval_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "COMFY_POLL_INTERVAL_MS",
                value: interval_ms.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        let poll = PollConfig {
            interval: Duration::from_millis(interval_ms),
            max_wait: Duration::from_secs(parse_or(
                &get,
                "COMFY_MAX_WAIT_SECS",
                defaults.poll.max_wait.as_secs(),
            )?),
        };

        Ok(Self {
            server_address: get("COMFY_SERVER_ADDRESS").unwrap_or(defaults.server_address),
            workflows_dir: get("COMFY_WORKFLOWS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workflows_dir),
            active_workflow: get("COMFY_ACTIVE_WORKFLOW").unwrap_or(defaults.active_workflow),
            poll,
            http_timeout: Duration::from_secs(parse_or(
                &get,
                "COMFY_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            retry: RetryConfig::with_attempts(parse_or(
                &get,
                "COMFY_RETRY_ATTEMPTS",
                defaults.retry.max_attempts,
            )?),
            completion: parse_or(&get, "COMFY_COMPLETION_MODE", defaults.completion)?,
        })
    }

    /// HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub fn api_url(&self) -> String {
        let addr = self.server_address.trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }

    /// WebSocket base URL matching [`api_url`](Self::api_url).
    pub fn ws_url(&self) -> String {
        let api = self.api_url();
        match api.strip_prefix("https://") {
            Some(rest) => format!("wss://{rest}"),
            None => format!("ws://{}", api.trim_start_matches("http://")),
        }
    }
}

fn parse_or<G, T>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ComfyUIConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ComfyUIConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_url(), "http://127.0.0.1:8188");
        assert_eq!(config.ws_url(), "ws://127.0.0.1:8188");
        assert_eq!(config.active_workflow, "illustrious");
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.poll.max_wait, Duration::from_secs(600));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.completion, CompletionStrategy::Poll);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("COMFY_SERVER_ADDRESS", "192.168.100.143:8188"),
            ("COMFY_ACTIVE_WORKFLOW", "flux"),
            ("COMFY_POLL_INTERVAL_MS", "250"),
            ("COMFY_MAX_WAIT_SECS", "30"),
            ("COMFY_RETRY_ATTEMPTS", "3"),
            ("COMFY_COMPLETION_MODE", "push"),
            ("COMFY_WORKFLOWS_DIR", "/srv/workflows"),
        ])
        .unwrap();

        assert_eq!(config.api_url(), "http://192.168.100.143:8188");
        assert_eq!(config.active_workflow, "flux");
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.max_wait, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.completion, CompletionStrategy::Push);
        assert_eq!(config.workflows_dir, PathBuf::from("/srv/workflows"));
    }

    #[test]
    fn https_address_maps_to_wss() {
        let config = config_from(&[("COMFY_SERVER_ADDRESS", "https://render.example.com/")]).unwrap();
        assert_eq!(config.api_url(), "https://render.example.com");
        assert_eq!(config.ws_url(), "wss://render.example.com");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("COMFY_MAX_WAIT_SECS", "  ")]).unwrap();
        assert_eq!(config.poll.max_wait, Duration::from_secs(600));
    }

    #[test]
    fn invalid_number_is_rejected() {
        assert_matches!(
            config_from(&[("COMFY_MAX_WAIT_SECS", "ten")]),
            Err(ConfigError::Invalid { var: "COMFY_MAX_WAIT_SECS", value, .. }) if value == "ten"
        );
    }

    #[test]
    fn invalid_mode_is_rejected() {
        assert_matches!(
            config_from(&[("COMFY_COMPLETION_MODE", "carrier-pigeon")]),
            Err(ConfigError::Invalid { var: "COMFY_COMPLETION_MODE", .. })
        );
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert_matches!(
            config_from(&[("COMFY_POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid { var: "COMFY_POLL_INTERVAL_MS", .. })
        );
    }
}
