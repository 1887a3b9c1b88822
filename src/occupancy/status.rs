use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeskStatus {
    Active,
    Inactive,
    Offline,
}

impl DeskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeskStatus::Active => "active",
            DeskStatus::Inactive => "inactive",
            DeskStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for DeskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusThresholds {
    /// Samples at least this far from `now`, in either direction, are stale.
    pub recency: Duration,
    pub activity: f64,
}

/// Derives a desk status from its most recent sample.
///
/// Missing samples, samples without a value and stale samples are offline.
/// Staleness uses the absolute distance to `now` so future-dated samples from
/// a skewed sensor clock are treated the same as expired ones.
pub fn classify(
    sample: Option<&Sample>,
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
) -> DeskStatus {
    let Some(sample) = sample else {
        return DeskStatus::Offline;
    };
    let Some(value) = sample.value else {
        return DeskStatus::Offline;
    };

    let age = if now >= sample.timestamp {
        now - sample.timestamp
    } else {
        sample.timestamp - now
    };
    if age >= thresholds.recency || value.is_nan() {
        return DeskStatus::Offline;
    }

    if value >= thresholds.activity {
        DeskStatus::Active
    } else {
        DeskStatus::Inactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> StatusThresholds {
        StatusThresholds {
            recency: Duration::minutes(16),
            activity: 500.0,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sample(age: Duration, value: f64) -> Sample {
        Sample::new(now() - age, "d1", "floor-1", Some(value))
    }

    #[test]
    fn missing_sample_is_offline() {
        assert_eq!(classify(None, now(), &thresholds()), DeskStatus::Offline);
    }

    #[test]
    fn recent_samples_at_or_above_threshold_are_active() {
        for (age_secs, value) in [(0, 500.0), (60, 600.0), (959, 850.0), (30, f64::MAX)] {
            let reading = sample(Duration::seconds(age_secs), value);
            assert_eq!(
                classify(Some(&reading), now(), &thresholds()),
                DeskStatus::Active,
                "age {age_secs}s value {value}"
            );
        }
    }

    #[test]
    fn recent_samples_below_threshold_are_inactive() {
        for value in [499.99, 0.0, -20.0] {
            let reading = sample(Duration::minutes(2), value);
            assert_eq!(classify(Some(&reading), now(), &thresholds()), DeskStatus::Inactive);
        }
    }

    #[test]
    fn stale_samples_are_offline_whatever_the_value() {
        for value in [-1.0e9, 0.0, 500.0, 1.0e12] {
            let at_threshold = sample(Duration::minutes(16), value);
            let old = sample(Duration::days(3), value);
            assert_eq!(classify(Some(&at_threshold), now(), &thresholds()), DeskStatus::Offline);
            assert_eq!(classify(Some(&old), now(), &thresholds()), DeskStatus::Offline);
        }
    }

    #[test]
    fn future_dated_samples_use_absolute_distance() {
        let slightly_ahead = sample(Duration::minutes(-5), 700.0);
        let far_ahead = sample(Duration::minutes(-16), 700.0);
        assert_eq!(classify(Some(&slightly_ahead), now(), &thresholds()), DeskStatus::Active);
        assert_eq!(classify(Some(&far_ahead), now(), &thresholds()), DeskStatus::Offline);
    }

    #[test]
    fn sample_without_value_is_offline() {
        let reading = Sample::new(now(), "d1", "floor-1", None);
        assert_eq!(classify(Some(&reading), now(), &thresholds()), DeskStatus::Offline);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DeskStatus::Inactive).unwrap(), "\"inactive\"");
        assert_eq!(DeskStatus::Active.to_string(), "active");
    }
}
