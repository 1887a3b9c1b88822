use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};

pub fn to_unix_seconds(value: DateTime<Utc>) -> i64 {
    value.timestamp()
}

pub fn from_unix_seconds(value: i64, field: &str) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value, 0)
        .ok_or_else(|| anyhow!("{field} contains out-of-range timestamp {value}"))
}

pub fn duration_seconds(value: Duration) -> i64 {
    value.num_seconds()
}

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}
