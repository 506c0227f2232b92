use serde::{Deserialize, Serialize};

// ============================================================================
// Health Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Live hub connections
    pub connections: usize,
    /// Launches currently running
    pub in_flight: usize,
    pub uptime_secs: i64,
}
