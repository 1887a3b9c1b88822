//! Sensor payload ingestion.
//!
//! A payload carries a batch of measurements from one physical desk sensor.
//! Only the RMS average is kept as the sample value. Desks that report before
//! being registered are added to the default zone, and every other registered
//! desk can receive a simulated reading at the same timestamp.

mod simulation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Desk, Sample};
use crate::error::{OccupancyError, OccupancyResult};
use crate::occupancy::{DeskRegistry, SampleStore};
use crate::settings::IngestSettings;

pub use simulation::{RandomFill, SampleSimulator};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorPayload {
    pub desk_id: String,
    #[serde(default)]
    pub data: Vec<Measurement>,
}

/// One sensor frame. Field names follow the sensor firmware.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Measurement {
    /// Unix seconds.
    pub timestamp: i64,
    pub mean_min: Option<f64>,
    pub mean_max: Option<f64>,
    pub mean_avg: Option<f64>,
    pub mean_mdn: Option<f64>,
    pub rms_min: Option<f64>,
    pub rms_max: Option<f64>,
    pub rms_avg: Option<f64>,
    pub rms_mdn: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub real_samples: usize,
    pub simulated_samples: usize,
    pub registered_desk: bool,
}

pub struct Ingestor<S, R> {
    store: S,
    registry: R,
    defaults: IngestSettings,
    simulator: Option<Box<dyn SampleSimulator>>,
}

impl<S, R> Ingestor<S, R>
where
    S: SampleStore,
    R: DeskRegistry,
{
    /// Uses `RandomFill` when simulation is enabled in `settings`.
    pub fn new(store: S, registry: R, settings: &IngestSettings) -> Self {
        let simulator: Option<Box<dyn SampleSimulator>> = if settings.simulation.enabled {
            Some(Box::new(RandomFill::from_settings(&settings.simulation)))
        } else {
            None
        };
        Self::with_simulator(store, registry, settings, simulator)
    }

    pub fn with_simulator(
        store: S,
        registry: R,
        settings: &IngestSettings,
        simulator: Option<Box<dyn SampleSimulator>>,
    ) -> Self {
        Self {
            store,
            registry,
            defaults: settings.clone(),
            simulator,
        }
    }

    pub async fn ingest(&self, payload: SensorPayload) -> OccupancyResult<IngestSummary> {
        let desk_id = payload.desk_id.trim();
        if desk_id.is_empty() {
            return Err(OccupancyError::invalid("deskId must not be empty"));
        }

        let frames = payload
            .data
            .iter()
            .map(|measurement| {
                DateTime::<Utc>::from_timestamp(measurement.timestamp, 0)
                    .map(|timestamp| (timestamp, measurement.rms_avg))
                    .ok_or_else(|| {
                        OccupancyError::invalid(format!(
                            "timestamp {} is out of range",
                            measurement.timestamp
                        ))
                    })
            })
            .collect::<OccupancyResult<Vec<_>>>()?;

        if frames.is_empty() {
            return Ok(IngestSummary {
                real_samples: 0,
                simulated_samples: 0,
                registered_desk: false,
            });
        }

        let mut desks = self.registry.list_all().await?;
        let mut registered_desk = false;
        let sensor_desk = match desks.iter().find(|desk| desk.desk_id == desk_id) {
            Some(desk) => desk.clone(),
            None => {
                let desk = Desk::new(self.defaults.default_zone_id.as_str(), desk_id).with_names(
                    Some(self.defaults.default_desk_name.clone()),
                    Some(self.defaults.default_zone_name.clone()),
                );
                match self.registry.insert(desk.clone()).await {
                    Ok(()) => {
                        registered_desk = true;
                        log_info!(
                            "registered reporting desk {} in zone {}",
                            desk.desk_id,
                            desk.zone_id
                        );
                    }
                    // Registered concurrently by another request.
                    Err(OccupancyError::Conflict(_)) => {}
                    Err(err) => return Err(err),
                }
                desks.push(desk.clone());
                desk
            }
        };

        let others: Vec<&Desk> = desks
            .iter()
            .filter(|desk| !desk.is_same_desk(&sensor_desk))
            .collect();

        let mut batch = Vec::new();
        let mut simulated_samples = 0;
        for (timestamp, value) in &frames {
            batch.push(Sample::new(
                *timestamp,
                sensor_desk.desk_id.clone(),
                sensor_desk.zone_id.clone(),
                *value,
            ));
            if let Some(simulator) = &self.simulator {
                let simulated = simulator.simulate(&others, *timestamp);
                simulated_samples += simulated.len();
                batch.extend(simulated);
            }
        }

        let written = self.store.write(batch).await?;
        log_debug!(
            "ingested {} sample(s) for desk {} ({} simulated)",
            written,
            sensor_desk.desk_id,
            simulated_samples
        );

        Ok(IngestSummary {
            real_samples: frames.len(),
            simulated_samples,
            registered_desk,
        })
    }
}
