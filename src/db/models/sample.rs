//! Time-series sample data model.
//!
//! Samples are append-only. Several samples of one desk may share a timestamp;
//! "last" is then decided by insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One RMS reading for a desk, or one aggregate row produced by a store query
/// (mean, count) in which case `timestamp` is the end of the aggregated window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub desk_id: String,
    pub zone_id: String,
    /// `None` when the sensor frame carried no RMS average.
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        desk_id: impl Into<String>,
        zone_id: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            desk_id: desk_id.into(),
            zone_id: zone_id.into(),
            value,
        }
    }
}
