use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    routing::get,
    Extension, Json, Router,
};
use chess_session::matchmaking::arrival_order;
use chess_session::transport::{ChannelSummary, Envelope, Hub, PresenceMember};
use chess_session::MoveEvent;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tower_http::cors::{Any, CorsLayer};

use crate::error::AppError;

/// Read-only view of the hub the relay serves.
pub fn router(hub: Arc<Hub>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/{room}/members", get(get_members))
        .route("/api/rooms/{room}/history", get(get_history))
        .route("/api/rooms/{room}/position", get(get_position))
        .layer(Extension(hub))
        .layer(cors)
}

/// GET /health
pub async fn health_check() -> Json<JsonValue> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/rooms
pub async fn list_rooms(Extension(hub): Extension<Arc<Hub>>) -> Json<Vec<ChannelSummary>> {
    Json(hub.summaries().await)
}

fn known_room(hub: &Hub, room: &str) -> Result<(), AppError> {
    if hub.contains(room) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Room '{room}' not found")))
    }
}

/// GET /api/rooms/{room}/members, in seating order
pub async fn get_members(
    Extension(hub): Extension<Arc<Hub>>,
    Path(room): Path<String>,
) -> Result<Json<Vec<PresenceMember>>, AppError> {
    known_room(&hub, &room)?;
    Ok(Json(arrival_order(&hub.members(&room).await)))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    /// Only the most recent `limit` publications
    pub limit: Option<usize>,
}

/// GET /api/rooms/{room}/history?limit=10
pub async fn get_history(
    Extension(hub): Extension<Arc<Hub>>,
    Path(room): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<Envelope>>, AppError> {
    known_room(&hub, &room)?;
    let mut history = hub.history(&room).await;
    if let Some(limit) = q.limit {
        if limit == 0 {
            return Err(AppError::BadRequest("limit must be positive".into()));
        }
        let skip = history.len().saturating_sub(limit);
        history.drain(..skip);
    }
    Ok(Json(history))
}

/// GET /api/rooms/{room}/position
/// The latest move event that decodes, i.e. the position a spectator would reach.
pub async fn get_position(
    Extension(hub): Extension<Arc<Hub>>,
    Path(room): Path<String>,
) -> Result<Json<JsonValue>, AppError> {
    known_room(&hub, &room)?;
    let history = hub.history(&room).await;
    let latest = history
        .iter()
        .rev()
        .find_map(|envelope| MoveEvent::decode(&envelope.data).ok())
        .ok_or_else(|| AppError::NotFound(format!("No moves in room '{room}'")))?;

    Ok(Json(serde_json::json!({
        "moveNum": latest.move_index,
        "colour": latest.side,
        "fen": latest.snapshot,
        "resigned": latest.resigned,
        "result": latest.finish().map(|f| f.to_string()),
    })))
}
