//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::{ui::state::AppState, usecase::GetRoomError};

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Get the room document by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.get_room_usecase.execute(room_id).await {
        Ok(room) => Ok(Json(room)),
        Err(GetRoomError::InvalidRoomId(e)) => {
            tracing::debug!("Rejected room lookup: {}", e);
            Err(StatusCode::BAD_REQUEST)
        }
        Err(GetRoomError::RoomNotFound) => Err(StatusCode::NOT_FOUND),
    }
}
