use axum::{extract::State, Json};

use crate::db::Zone;
use crate::error::OccupancyResult;
use crate::occupancy;

use super::{envelope, AppState, DataEnvelope};

pub async fn get_zones(State(state): State<AppState>) -> OccupancyResult<Json<DataEnvelope<Vec<Zone>>>> {
    let zones = occupancy::list_zones(&state.db).await?;
    Ok(envelope(zones))
}
