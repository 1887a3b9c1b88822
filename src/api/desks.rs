use std::collections::HashSet;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::Desk;
use crate::error::{OccupancyError, OccupancyResult};
use crate::occupancy::{self, DeskSnapshot, Lookback, SnapshotRequest};

use super::{envelope, AppState, DataEnvelope};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDesksParams {
    pub zone_id: Option<String>,
    /// Comma separated.
    pub desk_ids: Option<String>,
    /// Parsed here rather than by the extractor so a malformed value gets
    /// the usual error body.
    pub count: Option<String>,
    pub unit: Option<String>,
}

impl GetDesksParams {
    fn into_request(self) -> OccupancyResult<SnapshotRequest> {
        let zone_id = self
            .zone_id
            .ok_or_else(|| OccupancyError::invalid("zoneId is required"))?;

        let count = match self.count.as_deref().map(str::trim) {
            None | Some("") => 10,
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                OccupancyError::invalid(format!("count must be a positive integer, got '{raw}'"))
            })?,
        };
        let lookback = Lookback::parse(count, self.unit.as_deref().unwrap_or("day"))?;

        let mut request = SnapshotRequest::for_zone(zone_id).with_lookback(lookback);
        if let Some(raw) = self.desk_ids {
            let ids: HashSet<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if !ids.is_empty() {
                request = request.with_desk_ids(ids);
            }
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskParams {
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub desk_id: String,
    pub name: Option<String>,
    pub zone_name: Option<String>,
}

pub async fn get_desks(
    State(state): State<AppState>,
    Query(params): Query<GetDesksParams>,
) -> OccupancyResult<Json<DataEnvelope<Vec<DeskSnapshot>>>> {
    let request = params.into_request()?;
    let snapshots = state.snapshots.get_snapshots(&request).await?;
    Ok(envelope(snapshots))
}

pub async fn create_desk(
    State(state): State<AppState>,
    Query(params): Query<DeskParams>,
) -> OccupancyResult<(StatusCode, Json<DataEnvelope<Desk>>)> {
    let desk = occupancy::create_desk(
        &state.db,
        &params.zone_id,
        &params.desk_id,
        params.name,
        params.zone_name,
    )
    .await?;
    Ok((StatusCode::CREATED, envelope(desk)))
}

pub async fn delete_desk(
    State(state): State<AppState>,
    Query(params): Query<DeskParams>,
) -> OccupancyResult<impl IntoResponse> {
    occupancy::delete_desk(&state.db, &params.zone_id, &params.desk_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
