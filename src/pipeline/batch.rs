//! Batch scheduler: bounded-concurrency launch windows
//!
//! Requests are split into fixed-size windows. Each window runs concurrently
//! with settled semantics (a failure never cancels its siblings), and a fixed
//! delay separates windows to stay under external rate limits.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::orchestrator::Orchestrator;
use crate::config::BatchConfig;
use crate::domain::{LaunchRequest, LaunchResult};

/// One batch call: inputs plus throttling parameters
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub requests: Vec<LaunchRequest>,
    /// Launches run concurrently per window (0 is treated as 1)
    pub window_size: usize,
    /// Pause between consecutive windows
    pub inter_window_delay: Duration,
}

impl BatchJob {
    pub fn new(requests: Vec<LaunchRequest>, window_size: usize, inter_window_delay: Duration) -> Self {
        Self {
            requests,
            window_size,
            inter_window_delay,
        }
    }

    /// Use the configured window size and delay
    pub fn from_config(requests: Vec<LaunchRequest>, config: &BatchConfig) -> Self {
        Self::new(
            requests,
            config.window_size,
            Duration::from_millis(config.inter_window_delay_ms),
        )
    }
}

/// Per-item batch result, serialized as `{ success, result | error }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<LaunchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    fn success(request_id: String, result: LaunchResult) -> Self {
        Self {
            request_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(request_id: String, error: String) -> Self {
        Self {
            request_id,
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Runs batches of independent launches against one orchestrator
#[derive(Clone)]
pub struct BatchScheduler {
    orchestrator: Arc<Orchestrator>,
}

impl BatchScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Run every request; `outcomes[i]` always belongs to `requests[i]`.
    pub async fn run(&self, job: BatchJob) -> Vec<BatchOutcome> {
        let window_size = job.window_size.max(1);
        let total = job.requests.len();
        let windows = total.div_ceil(window_size);
        let mut outcomes = Vec::with_capacity(total);

        info!(total, window_size, windows, "starting launch batch");

        let mut pending = job.requests.into_iter().peekable();
        let mut window_index = 0;
        while pending.peek().is_some() {
            let window: Vec<LaunchRequest> = pending.by_ref().take(window_size).collect();
            window_index += 1;
            debug!(window = window_index, size = window.len(), "running window");

            // One task per launch, so a panicking executor only loses its own outcome
            let (ids, runs): (Vec<String>, Vec<_>) = window
                .into_iter()
                .map(|request| {
                    let orchestrator = self.orchestrator.clone();
                    let id = request.id.clone();
                    let run = tokio::spawn(async move {
                        let id = request.id.clone();
                        match orchestrator.start(request).await {
                            Ok(result) => BatchOutcome::success(id, result),
                            Err(e) => BatchOutcome::failure(id, e.to_string()),
                        }
                    });
                    (id, run)
                })
                .unzip();

            for (id, settled) in ids.into_iter().zip(join_all(runs).await) {
                outcomes.push(settled.unwrap_or_else(|e| {
                    error!(request_id = %id, error = %e, "launch task aborted");
                    BatchOutcome::failure(id, format!("launch task aborted: {e}"))
                }));
            }

            if pending.peek().is_some() && !job.inter_window_delay.is_zero() {
                tokio::time::sleep(job.inter_window_delay).await;
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        info!(total, succeeded, failed = total - succeeded, "launch batch finished");
        outcomes
    }
}
