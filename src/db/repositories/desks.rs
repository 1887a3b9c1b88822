use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{models::Desk, Database};

fn row_to_desk(row: &Row) -> Result<Desk> {
    Ok(Desk {
        desk_id: row.get("desk_id")?,
        zone_id: row.get("zone_id")?,
        name: row.get("name")?,
        zone_name: row.get("zone_name")?,
    })
}

impl Database {
    /// All registered desks in registration order.
    pub async fn list_desks(&self) -> Result<Vec<Desk>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT desk_id, zone_id, name, zone_name
                 FROM desks
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut desks = Vec::new();
            while let Some(row) = rows.next()? {
                desks.push(row_to_desk(row)?);
            }

            Ok(desks)
        })
        .await
    }

    pub async fn list_desks_in_zone(&self, zone_id: &str) -> Result<Vec<Desk>> {
        let zone_id = zone_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT desk_id, zone_id, name, zone_name
                 FROM desks
                 WHERE zone_id = ?1
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query(params![zone_id])?;
            let mut desks = Vec::new();
            while let Some(row) = rows.next()? {
                desks.push(row_to_desk(row)?);
            }

            Ok(desks)
        })
        .await
    }

    pub async fn desk_exists(&self, zone_id: &str, desk_id: &str) -> Result<bool> {
        let zone_id = zone_id.to_string();
        let desk_id = desk_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM desks WHERE zone_id = ?1 AND desk_id = ?2",
                params![zone_id, desk_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    /// Returns `false` when the `(zone, desk)` pair already exists.
    pub async fn insert_desk(&self, desk: &Desk) -> Result<bool> {
        let record = desk.clone();
        self.execute(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO desks (zone_id, desk_id, zone_name, name)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![record.zone_id, record.desk_id, record.zone_name, record.name],
                )
                .with_context(|| "failed to insert desk")?;
            Ok(inserted == 1)
        })
        .await
    }

    /// Returns `false` when nothing matched.
    pub async fn delete_desk(&self, zone_id: &str, desk_id: &str) -> Result<bool> {
        let zone_id = zone_id.to_string();
        let desk_id = desk_id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM desks WHERE zone_id = ?1 AND desk_id = ?2",
                    params![zone_id, desk_id],
                )
                .with_context(|| "failed to delete desk")?;
            Ok(deleted > 0)
        })
        .await
    }
}
