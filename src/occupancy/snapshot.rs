//! Desk snapshot assembly.
//!
//! A snapshot joins the registry's desks for one zone with the zone-wide
//! aggregate rows. The five aggregate queries run concurrently, their results
//! are indexed by desk id once, and each desk is then resolved with map
//! lookups. The whole request either succeeds or fails; there are no partial
//! snapshot lists.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Desk, Sample};
use crate::error::{OccupancyError, OccupancyResult};
use crate::settings::OccupancySettings;

use super::query::{Lookback, QueryBuilder};
use super::status::{classify, DeskStatus, StatusThresholds};
use super::store::{DeskRegistry, SampleStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskSnapshot {
    pub id: String,
    pub zone_id: String,
    pub name: Option<String>,
    pub status: DeskStatus,
    pub last_active_at: Option<DateTime<Utc>>,
    pub average_daily_usage: Option<f64>,
    pub average_work_hours_usage: Option<f64>,
    pub short_usages_count: Option<u64>,
}

impl DeskSnapshot {
    /// Snapshot for a desk missing one of the required aggregates.
    fn offline(desk: &Desk) -> Self {
        Self {
            id: desk.desk_id.clone(),
            zone_id: desk.zone_id.clone(),
            name: desk.name.clone(),
            status: DeskStatus::Offline,
            last_active_at: None,
            average_daily_usage: None,
            average_work_hours_usage: None,
            short_usages_count: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub zone_id: String,
    /// When set, only registered desks whose id is in the set are returned.
    pub desk_ids: Option<HashSet<String>>,
    pub lookback: Lookback,
}

impl SnapshotRequest {
    pub fn for_zone(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            desk_ids: None,
            lookback: Lookback::default(),
        }
    }

    pub fn with_desk_ids<I, S>(mut self, desk_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.desk_ids = Some(desk_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = lookback;
        self
    }

    /// A single requested desk narrows the store queries to that desk.
    fn single_desk(&self) -> Option<&str> {
        match &self.desk_ids {
            Some(ids) if ids.len() == 1 => ids.iter().next().map(String::as_str),
            _ => None,
        }
    }
}

/// Aggregate rows of one query keyed by desk id. When a query returns several
/// rows for a desk the latest one wins.
fn index_by_desk(rows: Vec<Sample>) -> HashMap<String, Sample> {
    rows.into_iter()
        .map(|row| (row.desk_id.clone(), row))
        .collect()
}

pub struct SnapshotAssembler<S, R> {
    store: S,
    registry: R,
    queries: QueryBuilder,
    thresholds: StatusThresholds,
    timeout: Duration,
}

impl<S, R> SnapshotAssembler<S, R>
where
    S: SampleStore,
    R: DeskRegistry,
{
    pub fn new(store: S, registry: R, settings: &OccupancySettings) -> Self {
        Self {
            store,
            registry,
            queries: QueryBuilder::new(settings),
            thresholds: settings.thresholds(),
            timeout: settings.request_timeout(),
        }
    }

    pub async fn get_snapshots(&self, request: &SnapshotRequest) -> OccupancyResult<Vec<DeskSnapshot>> {
        self.get_snapshots_at(request, Utc::now()).await
    }

    pub async fn get_snapshots_at(
        &self,
        request: &SnapshotRequest,
        now: DateTime<Utc>,
    ) -> OccupancyResult<Vec<DeskSnapshot>> {
        if request.zone_id.trim().is_empty() {
            return Err(OccupancyError::invalid("zoneId must not be empty"));
        }

        match tokio::time::timeout(self.timeout, self.assemble(request, now)).await {
            Ok(result) => result,
            Err(_) => Err(OccupancyError::Unavailable(format!(
                "snapshot request for zone {} timed out after {}s",
                request.zone_id,
                self.timeout.as_secs()
            ))),
        }
    }

    async fn assemble(
        &self,
        request: &SnapshotRequest,
        now: DateTime<Utc>,
    ) -> OccupancyResult<Vec<DeskSnapshot>> {
        let zone_id = request.zone_id.as_str();
        let desks: Vec<Desk> = self
            .registry
            .list_by_zone(zone_id)
            .await?
            .into_iter()
            .filter(|desk| match &request.desk_ids {
                Some(ids) => ids.contains(&desk.desk_id),
                None => true,
            })
            .collect();

        if desks.is_empty() {
            return Ok(Vec::new());
        }

        let desk_id = request.single_desk();
        let lookback = request.lookback;
        let (mean, workday_mean, last, last_active, short_usage) = tokio::try_join!(
            self.store.query(self.queries.mean(zone_id, desk_id, lookback, now)),
            self.store.query(self.queries.workday_mean(zone_id, desk_id, lookback, now)),
            self.store.query(self.queries.last_sample(zone_id, desk_id, now)),
            self.store.query(self.queries.last_active_sample(zone_id, desk_id, now)),
            self.store.query(self.queries.short_usage_count(zone_id, desk_id, lookback, now)),
        )?;

        let means = index_by_desk(mean);
        let workday_means = index_by_desk(workday_mean);
        let lasts = index_by_desk(last);
        let last_actives = index_by_desk(last_active);
        let short_usages = index_by_desk(short_usage);

        let snapshots = desks
            .iter()
            .map(|desk| {
                let key = &desk.desk_id;
                let (Some(mean), Some(workday_mean), Some(last), Some(short_usage)) = (
                    means.get(key),
                    workday_means.get(key),
                    lasts.get(key),
                    short_usages.get(key),
                ) else {
                    return DeskSnapshot::offline(desk);
                };

                DeskSnapshot {
                    id: desk.desk_id.clone(),
                    zone_id: desk.zone_id.clone(),
                    name: desk.name.clone(),
                    status: classify(Some(last), now, &self.thresholds),
                    last_active_at: last_actives.get(key).map(|sample| sample.timestamp),
                    average_daily_usage: mean.value,
                    average_work_hours_usage: workday_mean.value,
                    short_usages_count: short_usage.value.map(|count| count.max(0.0).round() as u64),
                }
            })
            .collect();

        Ok(snapshots)
    }
}
