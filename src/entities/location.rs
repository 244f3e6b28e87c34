use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};

use crate::error::{invalid_coordinates_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, Error> {
        let coordinates = Self { lat, lng };
        coordinates.validate()?;

        Ok(coordinates)
    }

    /// Rejects NaN as well as out-of-range values.
    pub fn validate(&self) -> Result<(), Error> {
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(invalid_coordinates_error());
        }

        Ok(())
    }
}

impl From<Coordinates> for Point<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.lng, coordinates.lat)
    }
}

impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Geometry::Point(coordinates.into())
    }
}

/// A point with an optional human readable label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Place {
    pub fn new(lat: f64, lng: f64, address: Option<String>) -> Self {
        Self {
            coordinates: Coordinates { lat, lng },
            address,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.coordinates.validate()
    }
}

#[test]
fn coordinate_bounds() {
    assert!(Coordinates::new(90.0, 180.0).is_ok());
    assert!(Coordinates::new(-90.0, -180.0).is_ok());
    assert!(Coordinates::new(0.0, 0.0).is_ok());

    assert!(Coordinates::new(90.0001, 0.0).unwrap_err().is_validation_error());
    assert!(Coordinates::new(0.0, -180.5).unwrap_err().is_validation_error());
    assert!(Coordinates::new(f64::NAN, 0.0).is_err());
}

#[test]
fn place_wire_format_is_flat() {
    let place: Place =
        serde_json::from_str(r#"{"lat": 55.75, "lng": 37.61, "address": "Red Square"}"#).unwrap();

    assert_eq!(place.coordinates, Coordinates { lat: 55.75, lng: 37.61 });
    assert_eq!(place.address.as_deref(), Some("Red Square"));

    let unlabeled = serde_json::to_value(Place::new(1.0, 2.0, None)).unwrap();
    assert_eq!(unlabeled, serde_json::json!({"lat": 1.0, "lng": 2.0}));
}
