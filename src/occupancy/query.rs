//! Aggregation query builder.
//!
//! Turns a `(zone, desk?, lookback)` request into store-agnostic
//! [`AggregateQuery`] values. The store decides how to execute them; this
//! module only fixes windows, filters and aggregation shape.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OccupancyError, OccupancyResult};
use crate::settings::OccupancySettings;

const MAX_LOOKBACK_COUNT: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookbackUnit {
    Day,
    Week,
    Month,
    Year,
}

impl LookbackUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookbackUnit::Day => "day",
            LookbackUnit::Week => "week",
            LookbackUnit::Month => "month",
            LookbackUnit::Year => "year",
        }
    }

    /// Duration suffix used in range expressions.
    pub fn suffix(&self) -> &'static str {
        match self {
            LookbackUnit::Day => "d",
            LookbackUnit::Week => "w",
            LookbackUnit::Month => "mo",
            LookbackUnit::Year => "y",
        }
    }

    /// Upper bound of one unit; months and years vary in length.
    fn max_span(&self) -> Duration {
        match self {
            LookbackUnit::Day => Duration::days(1),
            LookbackUnit::Week => Duration::weeks(1),
            LookbackUnit::Month => Duration::days(31),
            LookbackUnit::Year => Duration::days(366),
        }
    }
}

impl FromStr for LookbackUnit {
    type Err = OccupancyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "day" => Ok(LookbackUnit::Day),
            "week" => Ok(LookbackUnit::Week),
            "month" => Ok(LookbackUnit::Month),
            "year" => Ok(LookbackUnit::Year),
            other => Err(OccupancyError::invalid(format!(
                "unknown lookback unit '{other}' (expected day, week, month or year)"
            ))),
        }
    }
}

impl fmt::Display for LookbackUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lookback window expressed as `count` units before `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    count: u32,
    unit: LookbackUnit,
}

impl Default for Lookback {
    fn default() -> Self {
        Self {
            count: 10,
            unit: LookbackUnit::Day,
        }
    }
}

impl Lookback {
    pub fn new(count: u32, unit: LookbackUnit) -> OccupancyResult<Self> {
        if count == 0 || count > MAX_LOOKBACK_COUNT {
            return Err(OccupancyError::invalid(format!(
                "lookback count must be between 1 and {MAX_LOOKBACK_COUNT}, got {count}"
            )));
        }
        Ok(Self { count, unit })
    }

    pub fn parse(count: u32, unit: &str) -> OccupancyResult<Self> {
        Self::new(count, unit.parse()?)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> LookbackUnit {
        self.unit
    }

    /// Relative range start, e.g. `-5w`.
    pub fn range_expr(&self) -> String {
        format!("-{}{}", self.count, self.unit.suffix())
    }

    /// Width of the mean bucket, one unit wider than the lookback so a single
    /// bucket covers the whole range.
    pub fn aggregate_period(&self) -> Duration {
        self.unit.max_span() * (self.count as i32 + 1)
    }

    /// Calendar-aware start of the window; saturates at the earliest
    /// representable instant.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self.unit {
            LookbackUnit::Day => now.checked_sub_signed(Duration::days(i64::from(self.count))),
            LookbackUnit::Week => now.checked_sub_signed(Duration::weeks(i64::from(self.count))),
            LookbackUnit::Month => now.checked_sub_months(Months::new(self.count)),
            LookbackUnit::Year => self
                .count
                .checked_mul(12)
                .and_then(|months| now.checked_sub_months(Months::new(months))),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// `convert_range(5, "week") == "-5w"`.
pub fn convert_range(count: u32, unit: &str) -> OccupancyResult<String> {
    Ok(Lookback::parse(count, unit)?.range_expr())
}

/// Weekday (Mon-Fri) business-hours restriction, evaluated after shifting
/// timestamps by `utc_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub start_hour: u32,
    /// Exclusive.
    pub end_hour: u32,
    pub utc_offset: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleFilter {
    pub zone_id: String,
    pub desk_id: Option<String>,
    /// Keep only samples whose value is strictly above this.
    pub value_above: Option<f64>,
    pub business_hours: Option<BusinessHours>,
}

impl SampleFilter {
    fn new(zone_id: &str, desk_id: Option<&str>) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            desk_id: desk_id.map(str::to_string),
            value_above: None,
            business_hours: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Mean per desk per `period`-wide bucket, aligned to the window start.
    Mean { period: Duration },
    /// Most recent non-null sample per desk.
    Last,
    /// Up to `limit` most recent samples per desk, nulls included, in
    /// chronological order.
    Recent { limit: usize },
    /// Per desk, the number of samples above `threshold` that have a sample
    /// below it exactly `step` before and exactly `step` after.
    ShortUsageCount { step: Duration, threshold: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub start: DateTime<Utc>,
    /// Inclusive.
    pub stop: DateTime<Utc>,
    pub filter: SampleFilter,
    pub aggregation: Aggregation,
}

/// Builds the query shapes used by the snapshot assembler and the change
/// detector from the deployment's occupancy settings.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    activity_threshold: f64,
    last_sample_lookback: Duration,
    short_usage_step: Duration,
    business_hours: BusinessHours,
}

impl QueryBuilder {
    pub fn new(settings: &OccupancySettings) -> Self {
        Self {
            activity_threshold: settings.activity_threshold,
            last_sample_lookback: Duration::days(settings.last_sample_lookback_days),
            short_usage_step: Duration::minutes(settings.short_usage_step_mins),
            business_hours: BusinessHours {
                start_hour: settings.business_hours_start,
                end_hour: settings.business_hours_end,
                utc_offset: Duration::minutes(i64::from(settings.utc_offset_mins)),
            },
        }
    }

    pub fn mean(
        &self,
        zone_id: &str,
        desk_id: Option<&str>,
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> AggregateQuery {
        AggregateQuery {
            start: lookback.start(now),
            stop: now,
            filter: SampleFilter::new(zone_id, desk_id),
            aggregation: Aggregation::Mean {
                period: lookback.aggregate_period(),
            },
        }
    }

    pub fn workday_mean(
        &self,
        zone_id: &str,
        desk_id: Option<&str>,
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> AggregateQuery {
        let mut query = self.mean(zone_id, desk_id, lookback, now);
        query.filter.business_hours = Some(self.business_hours);
        query
    }

    fn last_sample_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.last_sample_lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn last_sample(&self, zone_id: &str, desk_id: Option<&str>, now: DateTime<Utc>) -> AggregateQuery {
        AggregateQuery {
            start: self.last_sample_start(now),
            stop: now,
            filter: SampleFilter::new(zone_id, desk_id),
            aggregation: Aggregation::Last,
        }
    }

    pub fn last_active_sample(
        &self,
        zone_id: &str,
        desk_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AggregateQuery {
        let mut query = self.last_sample(zone_id, desk_id, now);
        query.filter.value_above = Some(self.activity_threshold);
        query
    }

    pub fn short_usage_count(
        &self,
        zone_id: &str,
        desk_id: Option<&str>,
        lookback: Lookback,
        now: DateTime<Utc>,
    ) -> AggregateQuery {
        AggregateQuery {
            start: lookback.start(now),
            stop: now,
            filter: SampleFilter::new(zone_id, desk_id),
            aggregation: Aggregation::ShortUsageCount {
                step: self.short_usage_step,
                threshold: self.activity_threshold,
            },
        }
    }

    /// The two most recent samples of one desk within `window`.
    pub fn latest_pair(
        &self,
        zone_id: &str,
        desk_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AggregateQuery {
        AggregateQuery {
            start: now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC),
            stop: now,
            filter: SampleFilter::new(zone_id, Some(desk_id)),
            aggregation: Aggregation::Recent { limit: 2 },
        }
    }
}
