//! Error kinds surfaced by the occupancy core.
//!
//! Infrastructure code (database worker, migrations, settings) works with
//! `anyhow::Result`; everything crossing the store/registry boundary is
//! converted into one of these kinds so callers can decide how to react.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OccupancyError {
    /// Rejected before any I/O took place.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    /// Store or registry I/O failure, including request timeouts.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl OccupancyError {
    pub fn unavailable(err: anyhow::Error) -> Self {
        Self::Unavailable(format!("{err:#}"))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type OccupancyResult<T> = Result<T, OccupancyError>;
