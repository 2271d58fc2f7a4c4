//! Account balance lookup for the hosted LLM provider.
//!
//! Wraps `GET /api/v1/credits` and reduces the response to the total
//! purchased credit and the amount already spent.

use serde::{Deserialize, Serialize};

/// Default provider base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai";

/// Credit totals in the provider's currency (USD).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub total: f64,
    pub spent: f64,
}

impl CreditBalance {
    pub fn remaining(&self) -> f64 {
        self.total - self.spent
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("API_TOKEN is not set")]
    MissingToken,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Billing API error ({status}): {body}")]
    ApiError { status: u16, body: String },
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

/// Token and endpoint for the credits API.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub token: Option<String>,
    pub base_url: String,
}

impl BillingConfig {
    /// Read `API_TOKEN` and `OPENROUTER_BASE_URL` (default
    /// [`DEFAULT_BASE_URL`]). Blank values count as unset. A missing
    /// token is only an error once a client is built.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = get("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "OPENROUTER_BASE_URL",
                value: base_url,
                reason: "expected an http:// or https:// URL".into(),
            });
        }

        Ok(Self {
            token: get("API_TOKEN"),
            base_url,
        })
    }
}

#[derive(Deserialize)]
struct CreditsResponse {
    data: CreditsData,
}

#[derive(Deserialize)]
struct CreditsData {
    total_credits: f64,
    total_usage: f64,
}

/// HTTP client for the credits endpoint.
#[derive(Debug)]
pub struct CreditsClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CreditsClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &BillingConfig) -> Result<Self, BillingError> {
        let token = config.token.clone().ok_or(BillingError::MissingToken)?;
        Ok(Self::with_base_url(token, config.base_url.clone()))
    }

    /// Fetch the current balance.
    pub async fn fetch_balance(&self) -> Result<CreditBalance, BillingError> {
        let response = self
            .client
            .get(format!("{}/api/v1/credits", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let body: CreditsResponse = response.json().await?;
        let balance = CreditBalance {
            total: body.data.total_credits,
            spent: body.data.total_usage,
        };
        tracing::debug!(total = balance.total, spent = balance.spent, "Fetched credit balance");
        Ok(balance)
    }
}
