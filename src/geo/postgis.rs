use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use geo_types::Geometry;
use geozero::wkb;
use sqlx::{Executor, Pool, Postgres, Row};
use uuid::Uuid;

use super::{freshness_cutoff, GeoIndex, NearestQuery};
use crate::entities::{Coordinates, DriverPosition, NearbyDriver};
use crate::error::Error;

/// Driver positions in a PostGIS table. Distances are computed on the
/// geography type, which models the earth as a spheroid, so they differ from
/// the haversine figures of the memory index by a fraction of a percent.
#[derive(Clone, Debug)]
pub struct PostgisGeoIndex {
    pool: Pool<Postgres>,
    ttl: Option<Duration>,
}

impl PostgisGeoIndex {
    pub async fn new(pool: Pool<Postgres>, ttl: Option<Duration>) -> Result<Self, Error> {
        let mut conn = pool.acquire().await?;

        conn.execute("CREATE EXTENSION IF NOT EXISTS postgis").await?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS driver_positions (
                driver_id UUID PRIMARY KEY,
                location geometry(Point, 4326) NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS driver_positions_location_idx
                ON driver_positions USING GIST ((location::geography))",
        )
        .await?;

        Ok(Self { pool, ttl })
    }

    fn cutoff(&self) -> Option<DateTime<Utc>> {
        freshness_cutoff(self.ttl, Utc::now())
    }
}

#[async_trait]
impl GeoIndex for PostgisGeoIndex {
    #[tracing::instrument(skip(self))]
    async fn update_position(
        &self,
        driver_id: Uuid,
        coordinates: Coordinates,
    ) -> Result<DriverPosition, Error> {
        coordinates.validate()?;

        let position = DriverPosition::new(driver_id, coordinates);
        let location: Geometry<f64> = coordinates.into();

        let mut conn = self.pool.acquire().await?;
        conn.execute(
            sqlx::query(
                "INSERT INTO driver_positions (driver_id, location, updated_at)
                VALUES ($1, ST_SetSRID($2, 4326), $3)
                ON CONFLICT (driver_id) DO UPDATE
                SET location = EXCLUDED.location, updated_at = EXCLUDED.updated_at",
            )
            .bind(&driver_id)
            .bind(wkb::Encode(location))
            .bind(&position.updated_at),
        )
        .await?;

        Ok(position)
    }

    #[tracing::instrument(skip(self))]
    async fn find_position(&self, driver_id: Uuid) -> Result<Option<DriverPosition>, Error> {
        let mut conn = self.pool.acquire().await?;

        let row = conn
            .fetch_optional(
                sqlx::query(
                    "SELECT driver_id, ST_Y(location) AS lat, ST_X(location) AS lng, updated_at
                    FROM driver_positions
                    WHERE driver_id = $1 AND ($2::timestamptz IS NULL OR updated_at > $2)",
                )
                .bind(&driver_id)
                .bind(self.cutoff()),
            )
            .await?;

        row.map(|row| -> Result<DriverPosition, Error> {
            Ok(DriverPosition {
                driver_id: row.try_get("driver_id")?,
                coordinates: Coordinates {
                    lat: row.try_get("lat")?,
                    lng: row.try_get("lng")?,
                },
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn find_nearest(&self, query: NearestQuery) -> Result<Vec<NearbyDriver>, Error> {
        let center: Geometry<f64> = query.center()?.into();

        let sql = "
            SELECT
                driver_id,
                ST_Y(location) AS lat,
                ST_X(location) AS lng,
                updated_at,
                ST_Distance(location::geography, ST_SetSRID($1, 4326)::geography) / 1000.0 AS distance_km
            FROM
                driver_positions
            WHERE
                ($4::timestamptz IS NULL OR updated_at > $4)
                AND ST_DWithin(location::geography, ST_SetSRID($1, 4326)::geography, $2)
            ORDER BY
                distance_km ASC,
                driver_id ASC
            LIMIT $3
        ";

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query(sql)
                    .bind(wkb::Encode(center))
                    .bind(query.radius_km() * 1000.0)
                    .bind(query.limit())
                    .bind(self.cutoff()),
            )
            .await?;

        let mut nearby = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            nearby.push(NearbyDriver {
                driver_id: row.try_get("driver_id")?,
                lat: row.try_get("lat")?,
                lng: row.try_get("lng")?,
                distance_km: row.try_get("distance_km")?,
                updated_at: row.try_get("updated_at")?,
            });
        }

        Ok(nearby)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_driver(&self, driver_id: Uuid) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(sqlx::query("DELETE FROM driver_positions WHERE driver_id = $1").bind(&driver_id))
            .await?;

        Ok(())
    }

    async fn evict_stale(&self) -> Result<u64, Error> {
        let cutoff = match self.cutoff() {
            Some(cutoff) => cutoff,
            None => return Ok(0),
        };

        let mut conn = self.pool.acquire().await?;
        let result = conn
            .execute(sqlx::query("DELETE FROM driver_positions WHERE updated_at <= $1").bind(cutoff))
            .await?;

        Ok(result.rows_affected())
    }
}
