use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::occupancy::StatusThresholds;

/// Longest accepted minute-based window (one year).
const MAX_WINDOW_MINS: i64 = 366 * 24 * 60;
/// Longest accepted last-sample lookback (ten years).
const MAX_LOOKBACK_DAYS: i64 = 3660;
const MAX_UTC_OFFSET_MINS: i32 = 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub bind_address: String,
    pub database_path: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".into(),
            database_path: PathBuf::from("data/deskwatch.sqlite3"),
        }
    }
}

/// Thresholds and windows used when deriving desk status.
///
/// Deployments have historically run with different recency (3, 16 and 31
/// minutes) and activity (300 and 500) values, so none of them is baked into
/// the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OccupancySettings {
    /// A sample at least this far from `now` (either direction) means offline.
    pub recency_threshold_mins: i64,
    /// Values at or above this are active.
    pub activity_threshold: f64,
    /// How far back the last / last-active queries look, independent of the
    /// caller's lookback.
    pub last_sample_lookback_days: i64,
    /// Spacing between the three samples of a short-usage pattern.
    pub short_usage_step_mins: i64,
    pub business_hours_start: u32,
    /// Exclusive.
    pub business_hours_end: u32,
    /// Offset applied to sample timestamps before taking weekday and hour.
    pub utc_offset_mins: i32,
    pub request_timeout_secs: u64,
}

impl Default for OccupancySettings {
    fn default() -> Self {
        Self {
            recency_threshold_mins: 16,
            activity_threshold: 500.0,
            last_sample_lookback_days: 90,
            short_usage_step_mins: 5,
            business_hours_start: 9,
            business_hours_end: 17,
            utc_offset_mins: 0,
            request_timeout_secs: 10,
        }
    }
}

impl OccupancySettings {
    pub fn thresholds(&self) -> StatusThresholds {
        StatusThresholds {
            recency: Duration::minutes(self.recency_threshold_mins),
            activity: self.activity_threshold,
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub poll_interval_secs: u64,
    /// Only samples this recent take part in change detection.
    pub poll_window_mins: i64,
    pub cycle_timeout_secs: u64,
    pub channel_capacity: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            poll_window_mins: 44,
            cycle_timeout_secs: 30,
            channel_capacity: 16,
        }
    }
}

impl NotificationSettings {
    pub fn poll_window(&self) -> Duration {
        Duration::minutes(self.poll_window_mins)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationSettings {
    pub enabled: bool,
    pub value_min: f64,
    pub value_max: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            value_min: 200.0,
            value_max: 850.0,
        }
    }
}

/// Where unknown reporting desks get registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngestSettings {
    pub default_zone_id: String,
    pub default_zone_name: String,
    pub default_desk_name: String,
    pub simulation: SimulationSettings,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            default_zone_id: "zone1".into(),
            default_zone_name: "Conference Room".into(),
            default_desk_name: "Real Desk".into(),
            simulation: SimulationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub server: ServerSettings,
    pub occupancy: OccupancySettings,
    pub notifications: NotificationSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    /// Reads the JSON file at `path` (defaults when it does not exist), then
    /// applies `DESKWATCH_*` environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            Settings::default()
        };

        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(bind) = env::var("DESKWATCH_BIND") {
            self.server.bind_address = bind;
        }
        if let Ok(db) = env::var("DESKWATCH_DB") {
            self.server.database_path = PathBuf::from(db);
        }
        if let Ok(raw) = env::var("DESKWATCH_ACTIVITY_THRESHOLD") {
            self.occupancy.activity_threshold = raw
                .parse()
                .with_context(|| format!("invalid DESKWATCH_ACTIVITY_THRESHOLD '{raw}'"))?;
        }
        if let Ok(raw) = env::var("DESKWATCH_RECENCY_MINS") {
            self.occupancy.recency_threshold_mins = raw
                .parse()
                .with_context(|| format!("invalid DESKWATCH_RECENCY_MINS '{raw}'"))?;
        }
        if let Ok(raw) = env::var("DESKWATCH_SIMULATION") {
            self.ingest.simulation.enabled = raw == "1" || raw.eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let occupancy = &self.occupancy;
        within_minutes("recencyThresholdMins", occupancy.recency_threshold_mins)?;
        if !occupancy.activity_threshold.is_finite() || occupancy.activity_threshold <= 0.0 {
            bail!("activityThreshold must be a positive number");
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&occupancy.last_sample_lookback_days) {
            bail!(
                "lastSampleLookbackDays must be between 1 and {MAX_LOOKBACK_DAYS}, got {}",
                occupancy.last_sample_lookback_days
            );
        }
        within_minutes("shortUsageStepMins", occupancy.short_usage_step_mins)?;
        if occupancy.utc_offset_mins.abs() >= MAX_UTC_OFFSET_MINS {
            bail!("utcOffsetMins must be less than a day, got {}", occupancy.utc_offset_mins);
        }
        if occupancy.business_hours_end > 24
            || occupancy.business_hours_start >= occupancy.business_hours_end
        {
            bail!(
                "business hours {}..{} are not a valid range within a day",
                occupancy.business_hours_start,
                occupancy.business_hours_end
            );
        }
        if occupancy.request_timeout_secs == 0 {
            bail!("requestTimeoutSecs must be positive");
        }

        let notifications = &self.notifications;
        within_minutes("pollWindowMins", notifications.poll_window_mins)?;
        if notifications.poll_interval_secs == 0
            || notifications.cycle_timeout_secs == 0
            || notifications.channel_capacity == 0
        {
            bail!("notification intervals, window and channel capacity must be positive");
        }

        let simulation = &self.ingest.simulation;
        if !(simulation.value_min.is_finite() && simulation.value_max.is_finite())
            || simulation.value_min > simulation.value_max
        {
            bail!(
                "simulation range {}..={} is empty",
                simulation.value_min,
                simulation.value_max
            );
        }
        if simulation.value_min.ceil() > simulation.value_max.floor() {
            bail!(
                "simulation range {}..={} contains no whole number",
                simulation.value_min,
                simulation.value_max
            );
        }
        if self.ingest.default_zone_id.trim().is_empty() {
            bail!("defaultZoneId must not be empty");
        }

        Ok(())
    }
}

fn within_minutes(name: &str, value: i64) -> Result<()> {
    if !(1..=MAX_WINDOW_MINS).contains(&value) {
        bail!("{name} must be between 1 and {MAX_WINDOW_MINS}, got {value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.occupancy.thresholds().recency, Duration::minutes(16));
        assert_eq!(settings.occupancy.thresholds().activity, 500.0);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let settings: Settings = serde_json::from_str(
            r#"{ "occupancy": { "activityThreshold": 300, "recencyThresholdMins": 3 } }"#,
        )
        .unwrap();

        assert_eq!(settings.occupancy.activity_threshold, 300.0);
        assert_eq!(settings.occupancy.recency_threshold_mins, 3);
        assert_eq!(settings.occupancy.last_sample_lookback_days, 90);
        assert_eq!(settings.notifications.poll_window_mins, 44);
        assert!(settings.ingest.simulation.enabled);
    }

    #[test]
    fn load_reads_file_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskwatch.json");
        fs::write(&path, r#"{ "notifications": { "pollIntervalSecs": 120 } }"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.notifications.poll_interval_secs, 120);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskwatch.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn rejects_inverted_business_hours() {
        let mut settings = Settings::default();
        settings.occupancy.business_hours_start = 17;
        settings.occupancy.business_hours_end = 9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_empty_simulation_range() {
        let mut settings = Settings::default();
        settings.ingest.simulation.value_min = 900.0;
        settings.ingest.simulation.value_max = 100.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_windows() {
        let mut settings = Settings::default();
        settings.occupancy.last_sample_lookback_days = i64::MAX;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.occupancy.recency_threshold_mins = i64::MAX / 60;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.notifications.poll_window_mins = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.occupancy.utc_offset_mins = 24 * 60;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_simulation_range_without_whole_number() {
        let mut settings = Settings::default();
        settings.ingest.simulation.value_min = 200.5;
        settings.ingest.simulation.value_max = 200.7;
        assert!(settings.validate().is_err());

        settings.ingest.simulation.value_max = 201.0;
        settings.validate().unwrap();
    }
}
