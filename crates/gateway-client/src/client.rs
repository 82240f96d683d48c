//! HTTP client for the gateway API.

use crate::error::Error;
use crate::types::*;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;


/// Header carrying the caller's API key.
const API_KEY_HEADER: &str = "X-API-Key";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API (e.g., "http://localhost:8080").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// API key sent with every request, if any.
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }
}

/// HTTP client for the Signal Gateway API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GatewayClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Url::parse(&config.base_url)?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::new(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Performs a health check.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn health_check(&self) -> Result<HealthResponse, Error> {
        let url = format!("{}/health", self.base_url);
        let resp = self.send(self.client.get(&url)).await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Submits a signal for asynchronous parsing.
    ///
    /// # Errors
    /// Returns error if the request fails, is rate limited, or the queue is full.
    pub async fn submit_signal(
        &self,
        payload: Value,
        task_id: Option<&str>,
    ) -> Result<SubmitSignalResponse, Error> {
        let url = format!("{}/api/v1/signals/parse", self.base_url);
        let request = SubmitSignalRequest {
            task_id: task_id.map(str::to_string),
            payload,
        };
        let resp = self.send(self.client.post(&url).json(&request)).await?;
        self.handle_response(resp).await
    }

    /// Gets the status of a parsing task.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the task is unknown or expired.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskResult, Error> {
        if task_id.is_empty() {
            return Err(Error::InvalidRequest("task id must not be empty".to_string()));
        }
        let url = format!("{}/api/v1/signals/tasks/{}", self.base_url, task_id);
        let resp = self.send(self.client.get(&url)).await?;
        self.handle_response(resp).await
    }

    /// Polls a task until it completes or fails.
    ///
    /// # Errors
    /// Returns [`Error::Timeout`] if the task is still pending after `max_polls`.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        interval: Duration,
        max_polls: u32,
    ) -> Result<TaskResult, Error> {
        for _ in 0..max_polls {
            let result = self.get_task(task_id).await?;
            if result.status.is_terminal() {
                return Ok(result);
            }
            tokio::time::sleep(interval).await;
        }
        Err(Error::Timeout(task_id.to_string()))
    }

    /// Gets task processor statistics.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_signal_stats(&self) -> Result<SignalStatsResponse, Error> {
        let url = format!("{}/api/v1/signals/stats", self.base_url);
        let resp = self.send(self.client.get(&url)).await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Rate Limit Administration
    // ========================================================================

    /// Gets the active rate limit rules.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_rate_limits(&self) -> Result<RateLimitRulesResponse, Error> {
        let url = format!("{}/api/v1/admin/rate-limits", self.base_url);
        let resp = self.send(self.client.get(&url)).await?;
        self.handle_response(resp).await
    }

    /// Replaces the rate limit route table.
    ///
    /// # Errors
    /// Returns error if the request fails or a rule is rejected.
    pub async fn replace_rate_limits(
        &self,
        request: &ReplaceRateLimitsRequest,
    ) -> Result<RateLimitRulesResponse, Error> {
        let url = format!("{}/api/v1/admin/rate-limits", self.base_url);
        let resp = self.send(self.client.put(&url).json(request)).await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, Error> {
        let builder = match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        };
        Ok(builder.send().await?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status.is_success() {
            Ok(resp.json().await?)
        } else if status == StatusCode::NOT_FOUND {
            let text = resp.text().await.unwrap_or_default();
            Err(Error::NotFound(text))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            let header = retry_after_header(&resp);
            let text = resp.text().await.unwrap_or_default();
            let retry_after = header
                .or_else(|| retry_after_body(&text))
                .unwrap_or(1);
            Err(Error::RateLimited { retry_after })
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(Error::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

fn retry_after_header(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn retry_after_body(text: &str) -> Option<u64> {
    serde_json::from_str::<RateLimitErrorResponse>(text)
        .ok()
        .map(|body| body.retry_after)
}
