use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::websocket_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // WebSocket endpoint
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::adapters::SimulatedChain;
    use crate::api::types::HealthResponse;
    use crate::config::PipelineConfig;
    use crate::domain::CostModel;
    use crate::hub::Hub;
    use crate::pipeline::Orchestrator;

    fn state() -> AppState {
        let hub = Arc::new(Hub::new());
        let executors = SimulatedChain::new(Duration::ZERO, dec!(10), dec!(5)).into_executors();
        let orchestrator = Orchestrator::new(
            executors,
            hub.clone(),
            CostModel::default(),
            PipelineConfig::default(),
        );
        AppState::new(hub, Arc::new(orchestrator), 16)
    }

    async fn get_health(app: Router) -> (StatusCode, HealthResponse) {
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_counters() {
        let state = state();
        let (status, body) = get_health(create_router(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.connections, 0);
        assert_eq!(body.in_flight, 0);

        let (tx, _rx) = mpsc::channel(4);
        state.hub.register(tx);
        let (_, body) = get_health(create_router(state)).await;
        assert_eq!(body.connections, 1);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let response = create_router(state())
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_served() {
        let response = create_router(state())
            .oneshot(Request::get("/api/launches").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
