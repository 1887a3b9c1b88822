//! Desk registry data models.

use serde::{Deserialize, Serialize};

/// A registered desk. Identity is the `(zone_id, desk_id)` pair: the same
/// desk id may exist in several zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Desk {
    pub desk_id: String,
    pub zone_id: String,
    pub name: Option<String>,
    pub zone_name: Option<String>,
}

impl Desk {
    pub fn new(zone_id: impl Into<String>, desk_id: impl Into<String>) -> Self {
        Self {
            desk_id: desk_id.into(),
            zone_id: zone_id.into(),
            name: None,
            zone_name: None,
        }
    }

    pub fn with_names(mut self, name: Option<String>, zone_name: Option<String>) -> Self {
        self.name = name;
        self.zone_name = zone_name;
        self
    }

    pub fn is_same_desk(&self, other: &Desk) -> bool {
        self.zone_id == other.zone_id && self.desk_id == other.desk_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: Option<String>,
}
