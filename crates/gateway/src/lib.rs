//! HTTP API gateway for Memoria.
//!
//! Exposes the chat service over REST: a health check plus the v1 API for
//! chat, device links, memory, and model status.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;
pub mod error;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use memoria_agent::ChatService;
use memoria_config::AppConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use api_v1::{ApiV1State, SharedApiState};

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - CORS restricted to a local UI origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:8080"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the chat service once, starts the health probe when enabled, and
/// serves until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let service = Arc::new(ChatService::from_config(&config).await?);

    let probe = if config.probe.enabled {
        let probe = Arc::new(service.health_probe(Duration::from_secs(config.probe.interval_secs)));
        Some(probe.spawn())
    } else {
        None
    };

    let app = build_router(ApiV1State::new(service));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    if let Some(handle) = probe {
        handle.abort();
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub storage: String,
    pub models_total: usize,
    pub models_available: usize,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    let status = state.service.model_status();
    let available = status.values().filter(|s| s.available).count();
    Json(HealthResponse {
        status: if available > 0 { "ok" } else { "degraded" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
        storage: state.service.storage_backend().to_string(),
        models_total: status.len(),
        models_available: available,
    })
}
