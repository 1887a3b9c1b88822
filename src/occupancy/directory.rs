//! Desk and zone management on top of the registry.

use crate::db::{Desk, Zone};
use crate::error::{OccupancyError, OccupancyResult};

use super::store::DeskRegistry;

fn require_id(field: &str, value: &str) -> OccupancyResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(OccupancyError::invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Distinct zones in first-seen registry order. A zone's name comes from the
/// first of its desks that carries one.
pub fn zones_from_desks(desks: &[Desk]) -> Vec<Zone> {
    let mut zones: Vec<Zone> = Vec::new();
    for desk in desks {
        match zones.iter_mut().find(|zone| zone.id == desk.zone_id) {
            Some(zone) => {
                if zone.name.is_none() {
                    zone.name = desk.zone_name.clone();
                }
            }
            None => zones.push(Zone {
                id: desk.zone_id.clone(),
                name: desk.zone_name.clone(),
            }),
        }
    }
    zones
}

pub async fn list_zones<R: DeskRegistry>(registry: &R) -> OccupancyResult<Vec<Zone>> {
    let desks = registry.list_all().await?;
    Ok(zones_from_desks(&desks))
}

pub async fn create_desk<R: DeskRegistry>(
    registry: &R,
    zone_id: &str,
    desk_id: &str,
    name: Option<String>,
    zone_name: Option<String>,
) -> OccupancyResult<Desk> {
    let desk = Desk::new(require_id("zoneId", zone_id)?, require_id("deskId", desk_id)?)
        .with_names(name, zone_name);
    registry.insert(desk.clone()).await?;
    Ok(desk)
}

pub async fn delete_desk<R: DeskRegistry>(
    registry: &R,
    zone_id: &str,
    desk_id: &str,
) -> OccupancyResult<()> {
    let zone_id = require_id("zoneId", zone_id)?;
    let desk_id = require_id("deskId", desk_id)?;
    registry.delete(&zone_id, &desk_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_database;

    #[test]
    fn zones_keep_first_seen_order_and_first_known_name() {
        let desks = vec![
            Desk::new("floor-2", "a"),
            Desk::new("floor-1", "b").with_names(None, Some("Open Space".into())),
            Desk::new("floor-2", "c").with_names(None, Some("Library".into())),
            Desk::new("floor-2", "d").with_names(None, Some("Ignored".into())),
        ];

        assert_eq!(
            zones_from_desks(&desks),
            vec![
                Zone {
                    id: "floor-2".into(),
                    name: Some("Library".into()),
                },
                Zone {
                    id: "floor-1".into(),
                    name: Some("Open Space".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn create_then_delete_round_trips_through_the_registry() {
        let (_dir, db) = temp_database();

        let desk = create_desk(&db, "floor-1", " d1 ", Some("Window".into()), None)
            .await
            .unwrap();
        assert_eq!(desk.desk_id, "d1");
        assert!(matches!(
            create_desk(&db, "floor-1", "d1", None, None).await,
            Err(OccupancyError::Conflict(_))
        ));
        assert_eq!(list_zones(&db).await.unwrap().len(), 1);

        delete_desk(&db, "floor-1", "d1").await.unwrap();
        assert!(matches!(
            delete_desk(&db, "floor-1", "d1").await,
            Err(OccupancyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_ids_are_invalid() {
        let (_dir, db) = temp_database();
        assert!(matches!(
            create_desk(&db, "", "d1", None, None).await,
            Err(OccupancyError::InvalidArgument(_))
        ));
        assert!(matches!(
            delete_desk(&db, "floor-1", " ").await,
            Err(OccupancyError::InvalidArgument(_))
        ));
    }
}
