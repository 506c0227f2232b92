use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::hub::Hub;
use crate::pipeline::Orchestrator;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Connection registry shared with the orchestrator's event sink
    pub hub: Arc<Hub>,

    pub orchestrator: Arc<Orchestrator>,

    /// Bound of each connection's outbox
    pub outbox_capacity: usize,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, orchestrator: Arc<Orchestrator>, outbox_capacity: usize) -> Self {
        Self {
            hub,
            orchestrator,
            outbox_capacity: outbox_capacity.max(1),
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
