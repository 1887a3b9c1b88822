//! Desk occupancy core: aggregation queries, status derivation and snapshot
//! assembly over a generic sample store and desk registry.

pub mod directory;
pub mod query;
pub mod snapshot;
pub mod status;
pub mod store;

pub use directory::{create_desk, delete_desk, list_zones, zones_from_desks};
pub use query::{convert_range, Lookback, LookbackUnit, QueryBuilder};
pub use snapshot::{DeskSnapshot, SnapshotAssembler, SnapshotRequest};
pub use status::{classify, DeskStatus, StatusThresholds};
pub use store::{DeskRegistry, SampleStore};
