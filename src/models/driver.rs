use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Available,
    OnTrip,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Available => "available",
            DriverStatus::OnTrip => "on_trip",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "offline" => Ok(DriverStatus::Offline),
            "available" => Ok(DriverStatus::Available),
            "on_trip" => Ok(DriverStatus::OnTrip),
            other => Err(format!(
                "unknown driver status: {other}, expected offline/available/on_trip"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle_no: String,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    /// New drivers start offline with no known location.
    pub fn new(name: String, phone: String, vehicle_no: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            phone,
            vehicle_no,
            status: DriverStatus::Offline,
            location: None,
            last_update: now,
            created_at: now,
        }
    }
}
