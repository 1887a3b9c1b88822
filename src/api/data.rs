use axum::{extract::State, Json};

use crate::error::OccupancyResult;
use crate::ingest::{IngestSummary, SensorPayload};

use super::{envelope, AppState, DataEnvelope};

pub async fn push_data(
    State(state): State<AppState>,
    Json(payload): Json<SensorPayload>,
) -> OccupancyResult<Json<DataEnvelope<IngestSummary>>> {
    let summary = state.ingestor.ingest(payload).await?;
    Ok(envelope(summary))
}
