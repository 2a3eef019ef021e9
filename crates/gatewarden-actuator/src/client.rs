//! HTTP client for the gate controller webhook.

use std::time::{Duration, Instant};

use crate::error::ActuationError;
use crate::retry::{RetryPolicy, RetrySchedule};

/// Success statuses accepted from the gate controller.
const SUCCESS_STATUSES: [u16; 4] = [200, 201, 202, 204];

/// Configuration for the gate actuator, injected by the boundary layer.
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Gate controller webhook URL. When unset, actuation is simulated.
    pub endpoint: Option<String>,
    /// Optional bearer token sent with each request.
    pub token: Option<String>,
    /// Per-attempt request timeout in seconds.
    pub timeout_secs: u64,
    /// How long the gate should stay open, forwarded to the controller.
    pub open_duration_secs: u32,
    /// Retry bounds for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            timeout_secs: 10,
            open_duration_secs: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Interface to the physical gate.
///
/// The decision engine depends on this trait so admission logic can be tested
/// against a scripted actuator instead of a live device.
#[async_trait::async_trait]
pub trait Actuator: Send + Sync {
    /// Trigger a gate open. Returns the latency of the successful attempt.
    async fn open(&self) -> Result<Duration, ActuationError>;
}

/// Reqwest-based [`Actuator`] with bounded retry and capped backoff.
#[derive(Debug, Clone)]
pub struct ActuatorClient {
    config: ActuatorConfig,
    http: reqwest::Client,
}

impl ActuatorClient {
    /// Build a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ActuationError::InvalidConfig`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: ActuatorConfig) -> Result<Self, ActuationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("gatewarden-actuator/0.1")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ActuationError::InvalidConfig(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Execute a single open attempt against the configured endpoint.
    async fn attempt(&self, endpoint: &str) -> Result<Duration, ActuationError> {
        let started = Instant::now();

        let mut request = self.http.post(endpoint).json(&serde_json::json!({
            "action": "open",
            "duration_seconds": self.config.open_duration_secs,
            "source": "gatewarden",
        }));
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ActuationError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                ActuationError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if !SUCCESS_STATUSES.contains(&status) {
            return Err(ActuationError::Status(status));
        }

        Ok(started.elapsed())
    }
}

#[async_trait::async_trait]
impl Actuator for ActuatorClient {
    async fn open(&self) -> Result<Duration, ActuationError> {
        let Some(ref endpoint) = self.config.endpoint else {
            tracing::warn!(
                target: "gate_actuation",
                "Gate webhook URL not configured, simulating success"
            );
            return Ok(Duration::ZERO);
        };

        let mut schedule = RetrySchedule::new(self.config.retry);

        loop {
            match self.attempt(endpoint).await {
                Ok(latency) => {
                    tracing::info!(
                        target: "gate_actuation",
                        latency_ms = latency.as_millis() as u64,
                        attempt = schedule.attempts_made() + 1,
                        "Gate actuation succeeded"
                    );
                    return Ok(latency);
                }
                Err(err) => match schedule.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            target: "gate_actuation",
                            error = %err,
                            attempt = schedule.attempts_made(),
                            retry_in_ms = delay.as_millis() as u64,
                            "Gate actuation attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            target: "gate_actuation",
                            error = %err,
                            attempts = schedule.attempts_made(),
                            "Gate actuation failed, retry budget exhausted"
                        );
                        return Err(ActuationError::RetriesExhausted {
                            attempts: schedule.attempts_made(),
                            last: Box::new(err),
                        });
                    }
                },
            }
        }
    }
}
