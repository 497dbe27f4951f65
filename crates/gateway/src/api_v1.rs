//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                                       : Send a message, get a response
//! - `POST   /v1/links`                                      : Link two devices
//! - `DELETE /v1/links`                                      : Unlink two devices
//! - `GET    /v1/memory/{device_id}?limit=`                  : Recent turns, most recent last
//! - `DELETE /v1/memory/{device_id}/conversations/{conv_id}` : Delete one conversation
//! - `GET    /v1/models/status`                              : Model availability

use axum::{
    Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
};
use memoria_agent::{ChatService, SendMessage, SendMessageResponse};
use memoria_core::turn::{ConversationId, DeviceId, Turn};
use memoria_providers::ModelStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;

/// Default and maximum for `GET /v1/memory/{device_id}`.
const DEFAULT_MEMORY_LIMIT: usize = 20;
const MAX_MEMORY_LIMIT: usize = 1_000;

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub service: Arc<ChatService>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedApiState = Arc<ApiV1State>;

impl ApiV1State {
    pub fn new(service: Arc<ChatService>) -> SharedApiState {
        Arc::new(Self {
            service,
            start_time: chrono::Utc::now(),
        })
    }
}

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/links", post(link_handler).delete(unlink_handler))
        .route("/memory/{device_id}", get(read_memory_handler))
        .route(
            "/memory/{device_id}/conversations/{conversation_id}",
            delete(delete_conversation_handler),
        )
        .route("/models/status", get(model_status_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkRequest {
    pub device_id: DeviceId,
    pub target_device_id: DeviceId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkResponse {
    pub device_id: DeviceId,
    pub target_device_id: DeviceId,
    /// `true` if this call changed the link graph.
    pub changed: bool,
    pub linked: bool,
}

#[derive(Debug, Deserialize)]
struct MemoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryResponse {
    pub device_id: DeviceId,
    pub count: usize,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteConversationResponse {
    pub device_id: DeviceId,
    pub conversation_id: ConversationId,
    pub removed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelStatusResponse {
    pub models: BTreeMap<String, ModelStatus>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

async fn chat_handler(
    State(state): State<SharedApiState>,
    payload: Result<Json<SendMessage>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let request = json_body(payload)?;
    info!(device_id = %request.device_id, "v1/chat request");
    let response = state.service.send_message(request).await?;
    Ok(Json(response))
}

async fn link_handler(
    State(state): State<SharedApiState>,
    payload: Result<Json<LinkRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let request = json_body(payload)?;
    let changed = state
        .service
        .link_devices(&request.device_id, &request.target_device_id)
        .await?;
    Ok(Json(LinkResponse {
        linked: request.device_id != request.target_device_id,
        device_id: request.device_id,
        target_device_id: request.target_device_id,
        changed,
    }))
}

async fn unlink_handler(
    State(state): State<SharedApiState>,
    payload: Result<Json<LinkRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let request = json_body(payload)?;
    let changed = state
        .service
        .unlink_devices(&request.device_id, &request.target_device_id)
        .await?;
    Ok(Json(LinkResponse {
        device_id: request.device_id,
        target_device_id: request.target_device_id,
        changed,
        linked: false,
    }))
}

async fn read_memory_handler(
    State(state): State<SharedApiState>,
    Path(device_id): Path<String>,
    query: Result<Query<MemoryQuery>, QueryRejection>,
) -> Result<Json<MemoryResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MEMORY_LIMIT)
        .min(MAX_MEMORY_LIMIT);
    let device = DeviceId::new(device_id);
    let turns = state.service.read_memory(&device, limit).await?;
    Ok(Json(MemoryResponse {
        device_id: device,
        count: turns.len(),
        turns,
    }))
}

async fn delete_conversation_handler(
    State(state): State<SharedApiState>,
    Path((device_id, conversation_id)): Path<(String, String)>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    let device = DeviceId::new(device_id);
    let conversation = ConversationId::from(conversation_id.as_str());
    let removed = state
        .service
        .delete_conversation(&device, &conversation)
        .await?;
    Ok(Json(DeleteConversationResponse {
        device_id: device,
        conversation_id: conversation,
        removed,
    }))
}

async fn model_status_handler(State(state): State<SharedApiState>) -> Json<ModelStatusResponse> {
    Json(ModelStatusResponse {
        models: state.service.model_status(),
    })
}
