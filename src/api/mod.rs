//! HTTP and WebSocket transport.

mod data;
mod desks;
mod ws;
mod zones;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use crate::db::Database;
use crate::error::OccupancyError;
use crate::ingest::Ingestor;
use crate::notifications::ChangeReport;
use crate::occupancy::SnapshotAssembler;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub snapshots: Arc<SnapshotAssembler<Database, Database>>,
    pub ingestor: Arc<Ingestor<Database, Database>>,
    pub reports: broadcast::Sender<ChangeReport>,
}

/// Success body shape shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

pub fn envelope<T: Serialize>(data: T) -> Json<DataEnvelope<T>> {
    Json(DataEnvelope { data })
}

impl IntoResponse for OccupancyError {
    fn into_response(self) -> Response {
        let status = match &self {
            OccupancyError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            OccupancyError::NotFound(_) => StatusCode::NOT_FOUND,
            OccupancyError::Conflict(_) => StatusCode::CONFLICT,
            OccupancyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            log::error!("request failed: {self}");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(
            "/desks",
            get(desks::get_desks)
                .post(desks::create_desk)
                .delete(desks::delete_desk),
        )
        .route("/zones", get(zones::get_zones))
        .route("/data", axum::routing::post(data::push_data))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Json<DataEnvelope<&'static str>> {
    envelope("success")
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "subscribers": state.reports.receiver_count(),
    }))
}
