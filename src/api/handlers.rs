use axum::{extract::State, Json};

use crate::api::{state::AppState, types::HealthResponse};

/// GET /health -- liveness probe with hub and pipeline counters
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.hub.connected_count(),
        in_flight: state.orchestrator.in_flight_count(),
        uptime_secs: state.uptime_seconds(),
    })
}
