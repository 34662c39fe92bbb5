//! Switchyard HTTP API
//!
//! HTTP surface of the hub, built with Axum.
//!
//! # Endpoints
//!
//! ## Trigger
//! - `POST /api/v1/trigger` - Run one event, optionally under a live instance
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Event hub connection
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard::api::{serve, AppState};
//! use switchyard::config::Config;
//! use switchyard::hub::Hub;
//! use switchyard::store::open_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let hub = Hub::new(config.hub.clone(), open_store(&config.lock)?);
//!     let server = config.server.clone();
//!
//!     serve(AppState::new(hub, config), &server).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::transport::websocket_handler;

/// Largest accepted HTTP trigger body
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/trigger", post(routes::trigger::trigger_event))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server and run until a shutdown signal arrives
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Switchyard listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Switchyard shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::event::Event;
    use crate::hub::{Hub, HubConfig};
    use crate::session::Socket;
    use crate::store::MemoryStore;
    use crate::trigger::Tier;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    async fn create_test_app() -> (Router, Hub) {
        let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
        hub.on(Tier::Api, "ping", |mut ev: Event, _ctx| async move {
            ev.set_info("pong");
            Ok(ev)
        })
        .await;
        hub.on(Tier::On, "whoami", |ev: Event, _ctx| async move {
            let name = ev.username().unwrap_or_default().to_string();
            Ok(ev.with("username", name))
        })
        .await;

        let router = build_router(AppState::new(hub.clone(), Config::default()));
        (router, hub)
    }

    fn post_trigger(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/trigger")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["backend"], json!("memory"));
        assert_eq!(body["sessions"], json!(0));
    }

    #[tokio::test]
    async fn test_trigger_ping() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(post_trigger(json!({"event": {"type": "ping", "_id": 2}})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!([{"type": "ping", "_id": 2, "i": "pong"}])
        );
    }

    #[tokio::test]
    async fn test_trigger_malformed_event() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .clone()
            .oneshot(post_trigger(json!({"event": {"type": "Nope!"}})))
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!([{"type": "Nope!", "e": "malformed--type:Nope!"}])
        );

        let response = app
            .oneshot(post_trigger(json!({"event": 42})))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!([{"e": "malformed--json"}]));
    }

    #[tokio::test]
    async fn test_trigger_unknown_instance() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(post_trigger(json!({
                "instance": "AAAAAAAAAAAAAAAAAAAAAAAAA",
                "event": {"type": "ping"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trigger_malformed_instance() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(post_trigger(json!({
                "instance": "../etc",
                "event": {"type": "ping"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_trigger_under_live_instance() {
        let (app, hub) = create_test_app().await;
        hub.on(Tier::Api, "login", |mut ev: Event, _ctx| async move {
            ev.sign_in("anne");
            Ok(ev)
        })
        .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let socket = Socket::new(tx);
        hub.connect(&socket).await.unwrap();
        let created = hub
            .handle_message(&socket, json!({"type": "_instance"}))
            .await;
        let instance = created.get_str("instance").unwrap().to_string();
        hub.handle_message(&socket, json!({"type": "login"})).await;

        let response = app
            .oneshot(post_trigger(json!({
                "instance": instance,
                "event": {"type": "whoami"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!([{"type": "whoami", "username": "anne"}])
        );
    }

    #[tokio::test]
    async fn test_trigger_invalid_body() {
        let (app, _hub) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/trigger")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
