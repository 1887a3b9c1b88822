use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Row};

use crate::db::{
    helpers::{duration_seconds, from_unix_seconds, to_i64, to_unix_seconds},
    models::Sample,
    Database,
};
use crate::occupancy::query::{AggregateQuery, Aggregation, SampleFilter};

/// SQL text plus positional parameters in the order their `?` appear.
struct SqlPlan {
    sql: String,
    params: Vec<Value>,
}

/// Filter over the `samples` table aliased as `s`.
fn where_clause(
    filter: &SampleFilter,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> (String, Vec<Value>) {
    let mut clauses = vec![
        "s.zone_id = ?".to_string(),
        "s.timestamp >= ?".to_string(),
        "s.timestamp <= ?".to_string(),
    ];
    let mut params = vec![
        Value::Text(filter.zone_id.clone()),
        Value::Integer(to_unix_seconds(start)),
        Value::Integer(to_unix_seconds(stop)),
    ];

    if let Some(desk_id) = &filter.desk_id {
        clauses.push("s.desk_id = ?".into());
        params.push(Value::Text(desk_id.clone()));
    }

    if let Some(threshold) = filter.value_above {
        clauses.push("s.value > ?".into());
        params.push(Value::Real(threshold));
    }

    if let Some(hours) = &filter.business_hours {
        let offset = duration_seconds(hours.utc_offset);
        // %w: 0 = Sunday ... 6 = Saturday
        clauses.push(
            "CAST(strftime('%w', s.timestamp + ?, 'unixepoch') AS INTEGER) BETWEEN 1 AND 5".into(),
        );
        params.push(Value::Integer(offset));
        clauses.push("CAST(strftime('%H', s.timestamp + ?, 'unixepoch') AS INTEGER) >= ?".into());
        params.push(Value::Integer(offset));
        params.push(Value::Integer(i64::from(hours.start_hour)));
        clauses.push("CAST(strftime('%H', s.timestamp + ?, 'unixepoch') AS INTEGER) < ?".into());
        params.push(Value::Integer(offset));
        params.push(Value::Integer(i64::from(hours.end_hour)));
    }

    (clauses.join(" AND "), params)
}

impl SqlPlan {
    /// Every plan selects `desk_id, zone_id, value, ts`.
    fn for_query(query: &AggregateQuery) -> Result<Self> {
        let (filter_sql, filter_params) = where_clause(&query.filter, query.start, query.stop);
        let start = to_unix_seconds(query.start);
        let stop = to_unix_seconds(query.stop);

        let plan = match &query.aggregation {
            Aggregation::Mean { period } => {
                let period = duration_seconds(*period);
                if period <= 0 {
                    bail!("mean aggregation period must be positive, got {period}s");
                }

                // Bucket rows are stamped with their window end, capped at the range stop.
                let sql = format!(
                    "SELECT desk_id, zone_id, AVG(value) AS value,
                            MIN(?, ? + (bucket + 1) * ?) AS ts
                     FROM (
                         SELECT s.desk_id, s.zone_id, s.value, (s.timestamp - ?) / ? AS bucket
                         FROM samples s
                         WHERE {filter_sql} AND s.value IS NOT NULL
                     )
                     GROUP BY zone_id, desk_id, bucket
                     ORDER BY desk_id ASC, bucket ASC"
                );
                let mut params = vec![
                    Value::Integer(stop),
                    Value::Integer(start),
                    Value::Integer(period),
                    Value::Integer(start),
                    Value::Integer(period),
                ];
                params.extend(filter_params);
                SqlPlan { sql, params }
            }
            Aggregation::Last => {
                let sql = format!(
                    "SELECT desk_id, zone_id, value, ts
                     FROM (
                         SELECT s.desk_id, s.zone_id, s.value, s.timestamp AS ts,
                                ROW_NUMBER() OVER (
                                    PARTITION BY s.zone_id, s.desk_id
                                    ORDER BY s.timestamp DESC, s.id DESC
                                ) AS rn
                         FROM samples s
                         WHERE {filter_sql} AND s.value IS NOT NULL
                     )
                     WHERE rn = 1
                     ORDER BY desk_id ASC"
                );
                SqlPlan {
                    sql,
                    params: filter_params,
                }
            }
            Aggregation::Recent { limit } => {
                let sql = format!(
                    "SELECT desk_id, zone_id, value, ts
                     FROM (
                         SELECT s.desk_id, s.zone_id, s.value, s.timestamp AS ts, s.id AS sid,
                                ROW_NUMBER() OVER (
                                    PARTITION BY s.zone_id, s.desk_id
                                    ORDER BY s.timestamp DESC, s.id DESC
                                ) AS rn
                         FROM samples s
                         WHERE {filter_sql}
                     )
                     WHERE rn <= ?
                     ORDER BY desk_id ASC, ts ASC, sid ASC"
                );
                let mut params = filter_params;
                params.push(Value::Integer(to_i64(*limit)?));
                SqlPlan { sql, params }
            }
            Aggregation::ShortUsageCount { step, threshold } => {
                let step = duration_seconds(*step);
                if step <= 0 {
                    bail!("short usage step must be positive, got {step}s");
                }

                let sql = format!(
                    "SELECT s.desk_id, s.zone_id,
                            SUM(CASE WHEN s.value > ?
                                 AND EXISTS (
                                     SELECT 1 FROM samples p
                                     WHERE p.zone_id = s.zone_id AND p.desk_id = s.desk_id
                                       AND p.timestamp = s.timestamp - ? AND p.timestamp >= ?
                                       AND p.value < ?
                                 )
                                 AND EXISTS (
                                     SELECT 1 FROM samples n
                                     WHERE n.zone_id = s.zone_id AND n.desk_id = s.desk_id
                                       AND n.timestamp = s.timestamp + ? AND n.timestamp <= ?
                                       AND n.value < ?
                                 )
                                 THEN 1 ELSE 0 END) AS value,
                            ? AS ts
                     FROM samples s
                     WHERE {filter_sql} AND s.value IS NOT NULL
                     GROUP BY s.zone_id, s.desk_id
                     ORDER BY s.desk_id ASC"
                );
                let mut params = vec![
                    Value::Real(*threshold),
                    Value::Integer(step),
                    Value::Integer(start),
                    Value::Real(*threshold),
                    Value::Integer(step),
                    Value::Integer(stop),
                    Value::Real(*threshold),
                    Value::Integer(stop),
                ];
                params.extend(filter_params);
                SqlPlan { sql, params }
            }
        };

        Ok(plan)
    }
}

fn row_to_sample(row: &Row) -> Result<Sample> {
    let ts: i64 = row.get("ts")?;
    Ok(Sample {
        timestamp: from_unix_seconds(ts, "ts")?,
        desk_id: row.get("desk_id")?,
        zone_id: row.get("zone_id")?,
        value: row.get("value")?,
    })
}

impl Database {
    /// Appends the whole batch in one transaction.
    pub async fn insert_samples(&self, samples: Vec<Sample>) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open sample batch transaction")?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO samples (timestamp, desk_id, zone_id, value)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for sample in &samples {
                    stmt.execute(params![
                        to_unix_seconds(sample.timestamp),
                        sample.desk_id,
                        sample.zone_id,
                        sample.value,
                    ])
                    .with_context(|| format!("failed to insert sample for desk {}", sample.desk_id))?;
                }
            }
            tx.commit().context("failed to commit sample batch")?;
            Ok(samples.len())
        })
        .await
    }

    pub async fn run_aggregate(&self, query: AggregateQuery) -> Result<Vec<Sample>> {
        self.execute(move |conn| {
            let plan = SqlPlan::for_query(&query)?;
            let mut stmt = conn
                .prepare(&plan.sql)
                .with_context(|| format!("failed to prepare {:?} query", query.aggregation))?;

            let mut rows = stmt.query(params_from_iter(plan.params.iter()))?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row)?);
            }

            Ok(samples)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use crate::db::{test_support::temp_database, Database, Sample};
    use crate::occupancy::query::{Lookback, QueryBuilder};
    use crate::settings::OccupancySettings;

    // Wednesday.
    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new(&OccupancySettings::default())
    }

    async fn seed(db: &Database, rows: &[(&str, &str, &str, Option<f64>)]) {
        let samples = rows
            .iter()
            .map(|(ts, zone, desk, value)| Sample::new(at(ts), *desk, *zone, *value))
            .collect();
        db.insert_samples(samples).await.unwrap();
    }

    #[tokio::test]
    async fn mean_groups_by_desk_and_ignores_nulls_and_other_zones() {
        let (_dir, db) = temp_database();
        seed(
            &db,
            &[
                ("2024-01-09T10:00:00Z", "floor-1", "a", Some(100.0)),
                ("2024-01-09T11:00:00Z", "floor-1", "a", Some(300.0)),
                ("2024-01-09T12:00:00Z", "floor-1", "a", None),
                ("2024-01-09T10:00:00Z", "floor-1", "b", Some(700.0)),
                ("2024-01-09T10:00:00Z", "floor-2", "a", Some(9000.0)),
                // Outside the three-day lookback.
                ("2024-01-01T10:00:00Z", "floor-1", "b", Some(0.0)),
            ],
        )
        .await;

        let lookback = Lookback::parse(3, "day").unwrap();
        let rows = db
            .run_aggregate(builder().mean("floor-1", None, lookback, now()))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].desk_id.as_str(), rows[0].value), ("a", Some(200.0)));
        assert_eq!((rows[1].desk_id.as_str(), rows[1].value), ("b", Some(700.0)));
        // One bucket covers the whole lookback; it is stamped with the range stop.
        assert_eq!(rows[0].timestamp, now());
    }

    #[tokio::test]
    async fn workday_mean_keeps_weekday_business_hours_only() {
        let (_dir, db) = temp_database();
        seed(
            &db,
            &[
                ("2024-01-09T09:00:00Z", "floor-1", "a", Some(400.0)), // Tue, in hours
                ("2024-01-09T16:59:00Z", "floor-1", "a", Some(600.0)), // Tue, in hours
                ("2024-01-09T17:00:00Z", "floor-1", "a", Some(9999.0)), // Tue, after hours
                ("2024-01-09T08:59:00Z", "floor-1", "a", Some(9999.0)), // Tue, before hours
                ("2024-01-07T12:00:00Z", "floor-1", "a", Some(9999.0)), // Sun
                ("2024-01-06T12:00:00Z", "floor-1", "a", Some(9999.0)), // Sat
            ],
        )
        .await;

        let lookback = Lookback::parse(1, "week").unwrap();
        let rows = db
            .run_aggregate(builder().workday_mean("floor-1", None, lookback, now()))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(500.0));
    }

    #[tokio::test]
    async fn workday_mean_honours_utc_offset() {
        let (_dir, db) = temp_database();
        // 07:30 UTC is 09:30 at UTC+2.
        seed(&db, &[("2024-01-09T07:30:00Z", "floor-1", "a", Some(450.0))]).await;

        let mut settings = OccupancySettings::default();
        settings.utc_offset_mins = 120;
        let lookback = Lookback::parse(1, "week").unwrap();

        let shifted = db
            .run_aggregate(QueryBuilder::new(&settings).workday_mean("floor-1", None, lookback, now()))
            .await
            .unwrap();
        let unshifted = db
            .run_aggregate(builder().workday_mean("floor-1", None, lookback, now()))
            .await
            .unwrap();

        assert_eq!(shifted.len(), 1);
        assert!(unshifted.is_empty());
    }

    #[tokio::test]
    async fn last_and_last_active_pick_most_recent_rows() {
        let (_dir, db) = temp_database();
        seed(
            &db,
            &[
                ("2024-01-10T11:00:00Z", "floor-1", "a", Some(650.0)),
                ("2024-01-10T11:30:00Z", "floor-1", "a", Some(120.0)),
                ("2024-01-10T11:45:00Z", "floor-1", "a", None),
                ("2024-01-10T11:50:00Z", "floor-1", "b", Some(500.0)),
                // Duplicate timestamp: insertion order decides.
                ("2024-01-10T11:50:00Z", "floor-1", "b", Some(510.0)),
            ],
        )
        .await;

        let last = db
            .run_aggregate(builder().last_sample("floor-1", None, now()))
            .await
            .unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].value, Some(120.0));
        assert_eq!(last[0].timestamp, at("2024-01-10T11:30:00Z"));
        assert_eq!(last[1].value, Some(510.0));

        let active = db
            .run_aggregate(builder().last_active_sample("floor-1", None, now()))
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].timestamp, at("2024-01-10T11:00:00Z"));
        assert_eq!(active[1].value, Some(510.0));
    }

    #[tokio::test]
    async fn last_sample_ignores_data_older_than_long_lookback() {
        let (_dir, db) = temp_database();
        seed(&db, &[("2023-09-01T12:00:00Z", "floor-1", "a", Some(650.0))]).await;

        let last = db
            .run_aggregate(builder().last_sample("floor-1", Some("a"), now()))
            .await
            .unwrap();
        assert!(last.is_empty());
    }

    #[tokio::test]
    async fn short_usage_counts_brief_activations_and_reports_zero() {
        let (_dir, db) = temp_database();
        seed(
            &db,
            &[
                // a: low -> high -> low, five minutes apart: one short usage.
                ("2024-01-10T10:00:00Z", "floor-1", "a", Some(100.0)),
                ("2024-01-10T10:05:00Z", "floor-1", "a", Some(700.0)),
                ("2024-01-10T10:10:00Z", "floor-1", "a", Some(100.0)),
                // a: sustained use is not a short usage.
                ("2024-01-10T11:00:00Z", "floor-1", "a", Some(100.0)),
                ("2024-01-10T11:05:00Z", "floor-1", "a", Some(700.0)),
                ("2024-01-10T11:10:00Z", "floor-1", "a", Some(700.0)),
                ("2024-01-10T11:15:00Z", "floor-1", "a", Some(100.0)),
                // b: spacing does not match the step.
                ("2024-01-10T10:00:00Z", "floor-1", "b", Some(100.0)),
                ("2024-01-10T10:07:00Z", "floor-1", "b", Some(700.0)),
                ("2024-01-10T10:14:00Z", "floor-1", "b", Some(100.0)),
            ],
        )
        .await;

        let rows = db
            .run_aggregate(builder().short_usage_count("floor-1", None, Lookback::default(), now()))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].desk_id.as_str(), rows[0].value), ("a", Some(1.0)));
        assert_eq!((rows[1].desk_id.as_str(), rows[1].value), ("b", Some(0.0)));
    }

    #[tokio::test]
    async fn short_usage_needs_neighbours_inside_the_lookback() {
        let (_dir, db) = temp_database();
        seed(
            &db,
            &[
                // The one-day window starts at 2024-01-09T12:00Z.
                ("2024-01-09T11:57:00Z", "floor-1", "a", Some(100.0)),
                ("2024-01-09T12:02:00Z", "floor-1", "a", Some(700.0)),
                ("2024-01-09T12:07:00Z", "floor-1", "a", Some(100.0)),
                // The closing low sample lands after the window stop.
                ("2024-01-10T11:52:00Z", "floor-1", "b", Some(100.0)),
                ("2024-01-10T11:57:00Z", "floor-1", "b", Some(700.0)),
                ("2024-01-10T12:02:00Z", "floor-1", "b", Some(100.0)),
            ],
        )
        .await;

        let lookback = Lookback::parse(1, "day").unwrap();
        let rows = db
            .run_aggregate(builder().short_usage_count("floor-1", None, lookback, now()))
            .await
            .unwrap();

        let counts: Vec<(&str, Option<f64>)> = rows
            .iter()
            .map(|row| (row.desk_id.as_str(), row.value))
            .collect();
        assert_eq!(counts, vec![("a", Some(0.0)), ("b", Some(0.0))]);
    }

    #[tokio::test]
    async fn latest_pair_returns_two_newest_in_time_order_with_nulls() {
        let (_dir, db) = temp_database();
        seed(
            &db,
            &[
                ("2024-01-10T11:20:00Z", "floor-1", "a", Some(1.0)),
                ("2024-01-10T11:40:00Z", "floor-1", "a", Some(2.0)),
                ("2024-01-10T11:50:00Z", "floor-1", "a", None),
                ("2024-01-10T11:55:00Z", "floor-1", "b", Some(3.0)),
            ],
        )
        .await;

        let rows = db
            .run_aggregate(builder().latest_pair("floor-1", "a", Duration::minutes(44), now()))
            .await
            .unwrap();

        let values: Vec<Option<f64>> = rows.iter().map(|row| row.value).collect();
        assert_eq!(values, vec![Some(2.0), None]);
        assert!(rows.iter().all(|row| row.desk_id == "a"));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let (_dir, db) = temp_database();
        assert_eq!(db.insert_samples(Vec::new()).await.unwrap(), 0);
    }
}
