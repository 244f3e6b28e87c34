//! Live driver positions and radius queries over them.

mod memory;
mod postgis;

pub use memory::MemoryGeoIndex;
pub use postgis::PostgisGeoIndex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use geo_types::Point;
use serde::Deserialize;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Coordinates, DriverPosition, NearbyDriver};
use crate::error::{invalid_config_error, Error};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;
/// Longest staleness TTL accepted, one day.
pub const MAX_POSITION_TTL_SECS: u64 = 86_400;

#[async_trait]
pub trait GeoIndex {
    /// Validates the coordinates and replaces the driver's position.
    async fn update_position(
        &self,
        driver_id: Uuid,
        coordinates: Coordinates,
    ) -> Result<DriverPosition, Error>;

    /// The driver's live position, if it has one that has not gone stale.
    async fn find_position(&self, driver_id: Uuid) -> Result<Option<DriverPosition>, Error>;

    /// Live drivers within the query radius, closest first.
    async fn find_nearest(&self, query: NearestQuery) -> Result<Vec<NearbyDriver>, Error>;

    async fn remove_driver(&self, driver_id: Uuid) -> Result<(), Error>;

    /// Drops positions older than the staleness TTL and returns how many went.
    async fn evict_stale(&self) -> Result<u64, Error>;
}

pub type DynGeoIndex = Arc<dyn GeoIndex + Send + Sync>;

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct NearestQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
}

impl NearestQuery {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            radius_km: None,
            limit: None,
        }
    }

    pub fn center(&self) -> Result<Coordinates, Error> {
        Coordinates::new(self.lat, self.lng)
    }

    /// Missing or non-positive radius falls back to the default, as does NaN.
    pub fn radius_km(&self) -> f64 {
        match self.radius_km {
            Some(radius) if radius > 0.0 => radius,
            _ => DEFAULT_RADIUS_KM,
        }
    }

    pub fn limit(&self) -> i64 {
        match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        }
    }
}

/// Great-circle distance on a spherical earth.
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    let (lat1, lon1) = (a.y().to_radians(), a.x().to_radians());
    let (lat2, lon2) = (b.y().to_radians(), b.x().to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Oldest `updated_at` still considered live, or `None` when positions never
/// go stale.
pub(crate) fn freshness_cutoff(ttl: Option<Duration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| now - ttl)
}

/// Builds the geo index registered under `name`: `memory` or `postgis`. A
/// zero `ttl_secs` disables staleness expiry.
pub async fn backend(
    name: &str,
    ttl_secs: u64,
    pool: Option<Pool<Postgres>>,
) -> Result<DynGeoIndex, Error> {
    let ttl = match ttl_secs {
        0 => None,
        secs if secs > MAX_POSITION_TTL_SECS => {
            return Err(invalid_config_error("GEO_POSITION_TTL_SECS"))
        }
        secs => Some(Duration::seconds(secs as i64)),
    };

    match name {
        "memory" => Ok(Arc::new(MemoryGeoIndex::new(ttl))),
        "postgis" => {
            let pool = pool.ok_or_else(|| invalid_config_error("DATABASE_URL"))?;
            Ok(Arc::new(PostgisGeoIndex::new(pool, ttl).await?))
        }
        _ => Err(invalid_config_error("GEO_BACKEND")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distances() {
        let moscow = Point::new(37.6173, 55.7558);
        let st_petersburg = Point::new(30.3351, 59.9343);

        let distance = haversine_km(moscow, st_petersburg);
        assert!((distance - 634.0).abs() < 5.0, "{}", distance);

        assert_eq!(haversine_km(moscow, moscow), 0.0);

        // a degree of latitude is about 111 km everywhere
        let d = haversine_km(Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.1, "{}", d);
    }

    #[test]
    fn query_defaults() {
        let query = NearestQuery::new(0.0, 0.0);
        assert_eq!(query.radius_km(), DEFAULT_RADIUS_KM);
        assert_eq!(query.limit(), DEFAULT_LIMIT);

        let query = NearestQuery {
            radius_km: Some(-1.0),
            limit: Some(0),
            ..NearestQuery::new(0.0, 0.0)
        };
        assert_eq!(query.radius_km(), DEFAULT_RADIUS_KM);
        assert_eq!(query.limit(), DEFAULT_LIMIT);

        let query = NearestQuery {
            radius_km: Some(2.5),
            limit: Some(10_000),
            ..NearestQuery::new(0.0, 0.0)
        };
        assert_eq!(query.radius_km(), 2.5);
        assert_eq!(query.limit(), MAX_LIMIT);
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let err = tokio_test::block_on(backend("redis", 60, None)).err().unwrap();
        assert!(err.is_validation_error());

        let err = tokio_test::block_on(backend("postgis", 60, None)).err().unwrap();
        assert!(err.is_validation_error());
    }

    #[test]
    fn oversized_ttl_is_a_config_error() {
        assert!(tokio_test::block_on(backend("memory", MAX_POSITION_TTL_SECS, None)).is_ok());

        let err = tokio_test::block_on(backend("memory", u64::MAX, None)).err().unwrap();
        assert_eq!(err, invalid_config_error("GEO_POSITION_TTL_SECS"));
    }
}
