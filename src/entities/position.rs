use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Coordinates;

/// Latest known position of a driver. Only one exists per driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverPosition {
    pub driver_id: Uuid,
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub updated_at: DateTime<Utc>,
}

impl DriverPosition {
    pub fn new(driver_id: Uuid, coordinates: Coordinates) -> Self {
        Self {
            driver_id,
            coordinates,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
    pub updated_at: DateTime<Utc>,
}
