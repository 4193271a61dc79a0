//! HTTP delivery of callback events.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{CallbackConfig, RetryPolicy};
use crate::error::{CallbackError, Result};
use crate::event::CallbackEvent;
use crate::signature::{SIGNATURE_PREFIX, sign};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";
/// Header carrying the event id.
pub const EVENT_ID_HEADER: &str = "X-Event-ID";

const MAX_EXCERPT_CHARS: usize = 1024;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackResult {
    pub success: bool,
    /// HTTP status, when a response was received.
    pub status_code: Option<u16>,
    /// First characters of the response body.
    pub response_excerpt: String,
    pub duration: Duration,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    /// True when the endpoint's mask excluded the event and nothing was sent.
    pub filtered: bool,
}

impl CallbackResult {
    fn filtered(retry_count: u32) -> Self {
        Self {
            success: true,
            status_code: None,
            response_excerpt: String::new(),
            duration: Duration::ZERO,
            retry_count,
            timestamp: Utc::now(),
            error: None,
            filtered: true,
        }
    }

    fn failed(retry_count: u32, started: Instant, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            response_excerpt: String::new(),
            duration: started.elapsed(),
            retry_count,
            timestamp: Utc::now(),
            error: Some(error.into()),
            filtered: false,
        }
    }
}

/// Sends callback events to webhook endpoints.
///
/// Stateless apart from the pooled HTTP client; clones share the pool and
/// may be used concurrently.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl CallbackDispatcher {
    /// Creates a dispatcher with the default retry policy.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Makes one delivery attempt.
    ///
    /// Never fails: transport and status errors are reported in the result.
    /// Events excluded by the endpoint's mask succeed without a request.
    #[tracing::instrument(skip(self, config, event), fields(url = %config.url, event_id = %event.event_id, key = %event.key()))]
    pub async fn send_callback(&self, config: &CallbackConfig, event: &CallbackEvent) -> CallbackResult {
        if !config.events.matches(&event.event_type, &event.action) {
            tracing::debug!("event filtered out by mask");
            metrics::counter!("callback_deliveries_total", "outcome" => "filtered").increment(1);
            return CallbackResult::filtered(event.retry_count);
        }

        let started = Instant::now();
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => return CallbackResult::failed(event.retry_count, started, e.to_string()),
        };

        let mut request = self
            .http
            .post(&config.url)
            .timeout(config.timeout)
            .header(CONTENT_TYPE, "application/json");

        if let Some(secret) = &config.secret {
            let signature = match sign(secret, &body) {
                Ok(signature) => signature,
                Err(e) => return CallbackResult::failed(event.retry_count, started, e.to_string()),
            };
            request = request
                .header(SIGNATURE_HEADER, format!("{SIGNATURE_PREFIX}{signature}"))
                .header(EVENT_ID_HEADER, event.event_id.to_string());
        }

        let result = match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let success = status.is_success();
                CallbackResult {
                    success,
                    status_code: Some(status.as_u16()),
                    response_excerpt: text.chars().take(MAX_EXCERPT_CHARS).collect(),
                    duration: started.elapsed(),
                    retry_count: event.retry_count,
                    timestamp: Utc::now(),
                    error: (!success).then(|| format!("endpoint returned status {status}")),
                    filtered: false,
                }
            }
            Err(e) => CallbackResult::failed(event.retry_count, started, e.to_string()),
        };

        let outcome = if result.success { "delivered" } else { "failed" };
        metrics::counter!("callback_deliveries_total", "outcome" => outcome).increment(1);
        metrics::histogram!("callback_delivery_duration_seconds").record(result.duration.as_secs_f64());

        if result.success {
            tracing::info!(status = ?result.status_code, duration_ms = result.duration.as_millis() as u64, "callback delivered");
        } else {
            tracing::warn!(status = ?result.status_code, error = ?result.error, "callback attempt failed");
        }

        result
    }

    /// Delivers an event, retrying failed attempts with backoff.
    ///
    /// Up to `config.max_retries` retries follow the first attempt. Before each
    /// retry the event's `retry_count` is incremented so receivers can tell
    /// redeliveries apart. Cancellation interrupts the backoff sleep and returns
    /// the last attempt's error.
    #[tracing::instrument(skip(self, cancel, config, event), fields(url = %config.url, event_id = %event.event_id))]
    pub async fn send_callback_with_retry(
        &self,
        cancel: &CancellationToken,
        config: &CallbackConfig,
        event: &CallbackEvent,
    ) -> Result<CallbackResult> {
        let mut event = event.clone();
        let mut attempt: u32 = 0;

        loop {
            let result = self.send_callback(config, &event).await;
            if result.success {
                return Ok(result);
            }

            if attempt >= config.max_retries {
                tracing::error!(attempts = attempt + 1, error = ?result.error, "callback delivery failed");
                return Err(CallbackError::DeliveryFailed {
                    url: config.url.clone(),
                    attempts: attempt + 1,
                    result: Box::new(result),
                });
            }

            let delay = self.retry.delay_for(attempt);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::warn!(attempts = attempt + 1, "callback delivery cancelled");
                    return Err(CallbackError::Cancelled {
                        url: config.url.clone(),
                        result: Box::new(result),
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
            event.retry_count += 1;
        }
    }

    /// Delivers one event to several endpoints concurrently.
    ///
    /// Results are returned in the order of `configs`.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        configs: &[CallbackConfig],
        event: &CallbackEvent,
    ) -> Vec<Result<CallbackResult>> {
        join_all(
            configs
                .iter()
                .map(|config| self.send_callback_with_retry(cancel, config, event)),
        )
        .await
    }
}
