use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use h3o::{CellIndex, LatLng, Resolution};
use std::collections::HashSet;
use uuid::Uuid;

use super::{freshness_cutoff, haversine_km, GeoIndex, NearestQuery};
use crate::entities::{Coordinates, DriverPosition, NearbyDriver};
use crate::error::{invalid_coordinates_error, Error};

/// Cells of about 1.4 km a side, so a default 10 km query scans a disk of
/// a few hundred cells.
const RESOLUTION: Resolution = Resolution::Seven;

#[derive(Clone, Debug)]
struct Tracked {
    position: DriverPosition,
    cell: CellIndex,
}

/// Driver positions bucketed by H3 cell. Both maps are sharded, so writers
/// for different drivers rarely contend. A driver's position entry is always
/// locked before its cell bucket.
#[derive(Debug, Default)]
pub struct MemoryGeoIndex {
    positions: DashMap<Uuid, Tracked>,
    cells: DashMap<CellIndex, HashSet<Uuid>>,
    ttl: Option<Duration>,
}

fn cell_of(coordinates: Coordinates) -> Result<CellIndex, Error> {
    let point = LatLng::new(coordinates.lat, coordinates.lng)
        .map_err(|_| invalid_coordinates_error())?;

    Ok(point.to_cell(RESOLUTION))
}

/// Grid rings needed to cover `radius_km` around any point of the center
/// cell. Neighbouring cell centers are at least one and a half edges apart;
/// stepping by a single edge leaves room for H3's size distortion.
fn rings_for(radius_km: f64) -> f64 {
    (radius_km / RESOLUTION.edge_length_km()).ceil() + 2.0
}

/// Cells in a disk of `k` rings.
fn disk_size(k: f64) -> f64 {
    3.0 * k * (k + 1.0) + 1.0
}

impl MemoryGeoIndex {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            positions: DashMap::new(),
            cells: DashMap::new(),
            ttl,
        }
    }

    fn bucket(&self, cell: CellIndex, driver_id: Uuid) {
        self.cells.entry(cell).or_default().insert(driver_id);
    }

    fn unbucket(&self, cell: CellIndex, driver_id: Uuid) {
        if let Entry::Occupied(mut bucket) = self.cells.entry(cell) {
            bucket.get_mut().remove(&driver_id);
            if bucket.get().is_empty() {
                bucket.remove();
            }
        }
    }

    /// Drivers bucketed in the disk around `center`. Wide queries walk the
    /// occupied cells instead once the disk would be larger.
    fn candidates(&self, center: CellIndex, radius_km: f64) -> HashSet<Uuid> {
        let k = rings_for(radius_km);
        let mut found = HashSet::new();

        if disk_size(k) >= self.cells.len() as f64 {
            for bucket in self.cells.iter() {
                found.extend(bucket.value().iter().copied());
            }
        } else {
            for cell in center.grid_disk::<Vec<_>>(k as u32) {
                if let Some(bucket) = self.cells.get(&cell) {
                    found.extend(bucket.value().iter().copied());
                }
            }
        }

        found
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[cfg(test)]
    fn insert_raw(&self, position: DriverPosition) {
        let cell = cell_of(position.coordinates).unwrap();
        self.bucket(cell, position.driver_id);
        self.positions.insert(position.driver_id, Tracked { position, cell });
    }
}

#[async_trait]
impl GeoIndex for MemoryGeoIndex {
    #[tracing::instrument(skip(self))]
    async fn update_position(
        &self,
        driver_id: Uuid,
        coordinates: Coordinates,
    ) -> Result<DriverPosition, Error> {
        coordinates.validate()?;
        let cell = cell_of(coordinates)?;

        let position = DriverPosition::new(driver_id, coordinates);
        let tracked = Tracked {
            position: position.clone(),
            cell,
        };

        match self.positions.entry(driver_id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().cell;
                if previous != cell {
                    self.unbucket(previous, driver_id);
                    self.bucket(cell, driver_id);
                }
                entry.insert(tracked);
            }
            Entry::Vacant(entry) => {
                self.bucket(cell, driver_id);
                entry.insert(tracked);
            }
        }

        Ok(position)
    }

    async fn find_position(&self, driver_id: Uuid) -> Result<Option<DriverPosition>, Error> {
        let cutoff = freshness_cutoff(self.ttl, Utc::now());

        Ok(self
            .positions
            .get(&driver_id)
            .map(|entry| entry.value().position.clone())
            .filter(|position| cutoff.map_or(true, |cutoff| position.updated_at > cutoff)))
    }

    #[tracing::instrument(skip(self))]
    async fn find_nearest(&self, query: NearestQuery) -> Result<Vec<NearbyDriver>, Error> {
        let center = query.center()?;
        let radius_km = query.radius_km();
        let cutoff = freshness_cutoff(self.ttl, Utc::now());

        let mut nearby: Vec<NearbyDriver> = self
            .candidates(cell_of(center)?, radius_km)
            .into_iter()
            .filter_map(|driver_id| self.positions.get(&driver_id))
            .filter(|entry| cutoff.map_or(true, |cutoff| entry.position.updated_at > cutoff))
            .filter_map(|entry| {
                let position = &entry.value().position;
                let distance_km = haversine_km(center.into(), position.coordinates.into());

                (distance_km <= radius_km).then(|| NearbyDriver {
                    driver_id: position.driver_id,
                    lat: position.coordinates.lat,
                    lng: position.coordinates.lng,
                    distance_km,
                    updated_at: position.updated_at,
                })
            })
            .collect();

        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        nearby.truncate(query.limit() as usize);

        Ok(nearby)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_driver(&self, driver_id: Uuid) -> Result<(), Error> {
        if let Entry::Occupied(entry) = self.positions.entry(driver_id) {
            self.unbucket(entry.get().cell, driver_id);
            entry.remove();
        }

        Ok(())
    }

    async fn evict_stale(&self) -> Result<u64, Error> {
        let cutoff = match freshness_cutoff(self.ttl, Utc::now()) {
            Some(cutoff) => cutoff,
            None => return Ok(0),
        };

        let before = self.positions.len();
        self.positions.retain(|driver_id, tracked| {
            let live = tracked.position.updated_at > cutoff;
            if !live {
                self.unbucket(tracked.cell, *driver_id);
            }
            live
        });
        let evicted = before.saturating_sub(self.positions.len()) as u64;

        if evicted > 0 {
            tracing::debug!("evicted {} stale driver positions", evicted);
        }

        Ok(evicted)
    }
}
