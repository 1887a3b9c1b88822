//! Capabilities the occupancy core consumes: an append-only sample store and a
//! desk registry. `Database` implements both; services stay generic so any
//! other backing can be swapped in.

use std::future::Future;

use crate::db::{Database, Desk, Sample};
use crate::error::{OccupancyError, OccupancyResult};

use super::query::AggregateQuery;

pub trait SampleStore: Send + Sync {
    /// Appends a batch; the batch is durable once this resolves.
    fn write(&self, samples: Vec<Sample>) -> impl Future<Output = OccupancyResult<usize>> + Send;

    /// Runs one aggregate query and returns its rows ordered by desk, then
    /// time.
    fn query(
        &self,
        query: AggregateQuery,
    ) -> impl Future<Output = OccupancyResult<Vec<Sample>>> + Send;
}

pub trait DeskRegistry: Send + Sync {
    fn list_all(&self) -> impl Future<Output = OccupancyResult<Vec<Desk>>> + Send;

    fn list_by_zone(&self, zone_id: &str) -> impl Future<Output = OccupancyResult<Vec<Desk>>> + Send;

    fn exists(
        &self,
        zone_id: &str,
        desk_id: &str,
    ) -> impl Future<Output = OccupancyResult<bool>> + Send;

    /// Fails with `Conflict` when the `(zone, desk)` pair is already
    /// registered.
    fn insert(&self, desk: Desk) -> impl Future<Output = OccupancyResult<()>> + Send;

    /// Fails with `NotFound` when the pair is not registered.
    fn delete(&self, zone_id: &str, desk_id: &str) -> impl Future<Output = OccupancyResult<()>> + Send;
}

impl SampleStore for Database {
    async fn write(&self, samples: Vec<Sample>) -> OccupancyResult<usize> {
        self.insert_samples(samples)
            .await
            .map_err(OccupancyError::unavailable)
    }

    async fn query(&self, query: AggregateQuery) -> OccupancyResult<Vec<Sample>> {
        self.run_aggregate(query)
            .await
            .map_err(OccupancyError::unavailable)
    }
}

impl DeskRegistry for Database {
    async fn list_all(&self) -> OccupancyResult<Vec<Desk>> {
        self.list_desks().await.map_err(OccupancyError::unavailable)
    }

    async fn list_by_zone(&self, zone_id: &str) -> OccupancyResult<Vec<Desk>> {
        self.list_desks_in_zone(zone_id)
            .await
            .map_err(OccupancyError::unavailable)
    }

    async fn exists(&self, zone_id: &str, desk_id: &str) -> OccupancyResult<bool> {
        self.desk_exists(zone_id, desk_id)
            .await
            .map_err(OccupancyError::unavailable)
    }

    async fn insert(&self, desk: Desk) -> OccupancyResult<()> {
        let key = format!("desk {} in zone {}", desk.desk_id, desk.zone_id);
        let inserted = self
            .insert_desk(&desk)
            .await
            .map_err(OccupancyError::unavailable)?;
        if inserted {
            Ok(())
        } else {
            Err(OccupancyError::Conflict(key))
        }
    }

    async fn delete(&self, zone_id: &str, desk_id: &str) -> OccupancyResult<()> {
        let deleted = self
            .delete_desk(zone_id, desk_id)
            .await
            .map_err(OccupancyError::unavailable)?;
        if deleted {
            Ok(())
        } else {
            Err(OccupancyError::NotFound(format!(
                "desk {desk_id} in zone {zone_id}"
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Registry whose backing is unreachable.
    pub struct FailingRegistry;

    fn offline<T>() -> OccupancyResult<T> {
        Err(OccupancyError::Unavailable("registry offline".into()))
    }

    impl DeskRegistry for FailingRegistry {
        async fn list_all(&self) -> OccupancyResult<Vec<Desk>> {
            offline()
        }

        async fn list_by_zone(&self, _zone_id: &str) -> OccupancyResult<Vec<Desk>> {
            offline()
        }

        async fn exists(&self, _zone_id: &str, _desk_id: &str) -> OccupancyResult<bool> {
            offline()
        }

        async fn insert(&self, _desk: Desk) -> OccupancyResult<()> {
            offline()
        }

        async fn delete(&self, _zone_id: &str, _desk_id: &str) -> OccupancyResult<()> {
            offline()
        }
    }
}
