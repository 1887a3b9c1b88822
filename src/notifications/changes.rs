use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::db::{Desk, Sample};
use crate::error::OccupancyResult;
use crate::occupancy::{classify, DeskRegistry, DeskStatus, QueryBuilder, SampleStore, StatusThresholds};
use crate::settings::{NotificationSettings, OccupancySettings};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    pub zone_id: String,
    pub desk_id: String,
    pub previous_status: DeskStatus,
    pub new_status: DeskStatus,
}

impl fmt::Display for StatusChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Desk {} in zone {} changed status from {} to {}",
            self.desk_id, self.zone_id, self.previous_status, self.new_status
        )
    }
}

/// The events of one poll cycle, in registry order. An empty report is still
/// a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub generated_at: DateTime<Utc>,
    pub events: Vec<StatusChangeEvent>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.events.is_empty() {
            return f.write_str("No desk status changes");
        }

        for (idx, event) in self.events.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{event}")?;
        }
        Ok(())
    }
}

/// Compares the two newest valid samples of a desk. `recent` must be in
/// chronological order; null values are dropped and anything other than
/// exactly two remaining samples yields no event.
pub fn detect_change(
    desk: &Desk,
    recent: &[Sample],
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
) -> Option<StatusChangeEvent> {
    let valid: Vec<&Sample> = recent.iter().filter(|sample| sample.value.is_some()).collect();
    let [previous, latest] = valid.as_slice() else {
        return None;
    };

    let previous_status = classify(Some(*previous), now, thresholds);
    let new_status = classify(Some(*latest), now, thresholds);
    (previous_status != new_status).then(|| StatusChangeEvent {
        zone_id: desk.zone_id.clone(),
        desk_id: desk.desk_id.clone(),
        previous_status,
        new_status,
    })
}

/// Best-effort status change detection across every registered desk.
pub struct ChangeDetector<S, R> {
    store: Arc<S>,
    registry: R,
    queries: QueryBuilder,
    thresholds: StatusThresholds,
    window: Duration,
}

impl<S, R> ChangeDetector<S, R>
where
    S: SampleStore + 'static,
    R: DeskRegistry,
{
    pub fn new(
        store: S,
        registry: R,
        occupancy: &OccupancySettings,
        notifications: &NotificationSettings,
    ) -> Self {
        Self {
            store: Arc::new(store),
            registry,
            queries: QueryBuilder::new(occupancy),
            thresholds: occupancy.thresholds(),
            window: notifications.poll_window(),
        }
    }

    pub async fn poll_changes(&self) -> OccupancyResult<ChangeReport> {
        self.poll_changes_at(Utc::now()).await
    }

    /// Fails only when the registry cannot be listed; per-desk store errors
    /// are logged and that desk is skipped for the cycle.
    pub async fn poll_changes_at(&self, now: DateTime<Utc>) -> OccupancyResult<ChangeReport> {
        let desks = self.registry.list_all().await?;

        let mut tasks = JoinSet::new();
        for (position, desk) in desks.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let query = self
                .queries
                .latest_pair(&desk.zone_id, &desk.desk_id, self.window, now);
            tasks.spawn(async move {
                let result = store.query(query).await;
                (position, desk, result)
            });
        }

        let mut found = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (position, desk, result) = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    log_warn!("change detection task failed to join: {err}");
                    continue;
                }
            };

            match result {
                Ok(recent) => {
                    if let Some(event) = detect_change(&desk, &recent, now, &self.thresholds) {
                        log_info!("{event}");
                        found.push((position, event));
                    }
                }
                Err(err) => {
                    log_warn!(
                        "skipping desk {} in zone {} this cycle: {err}",
                        desk.desk_id,
                        desk.zone_id
                    );
                }
            }
        }

        found.sort_by_key(|(position, _)| *position);
        Ok(ChangeReport {
            generated_at: now,
            events: found.into_iter().map(|(_, event)| event).collect(),
        })
    }
}
