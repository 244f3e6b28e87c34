use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Bid, Coordinates, DriverPosition, NearbyDriver, Place, Ride, RideStatus};
use crate::error::Error;
use crate::geo::NearestQuery;

#[async_trait]
pub trait RideAPI {
    async fn create_ride(&self, user: User, origin: Place, destination: Place)
        -> Result<Ride, Error>;

    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;

    async fn update_status(&self, user: User, id: Uuid, status: RideStatus)
        -> Result<Ride, Error>;

    async fn list_open_rides(&self, user: User, limit: Option<i64>) -> Result<Vec<Ride>, Error>;

    async fn list_rides_by_passenger(
        &self,
        user: User,
        passenger_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Ride>, Error>;

    async fn list_rides_by_driver(
        &self,
        user: User,
        driver_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Ride>, Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn place_bid(&self, user: User, ride_id: Uuid, price: i64) -> Result<Bid, Error>;

    async fn list_bids(&self, user: User, ride_id: Uuid) -> Result<Vec<Bid>, Error>;

    async fn accept_bid(&self, user: User, ride_id: Uuid, bid_id: Uuid) -> Result<Ride, Error>;
}

#[async_trait]
pub trait DriverLocationAPI {
    async fn update_driver_location(
        &self,
        user: User,
        driver_id: Uuid,
        coordinates: Coordinates,
    ) -> Result<DriverPosition, Error>;

    async fn remove_driver_location(&self, user: User, driver_id: Uuid) -> Result<(), Error>;
}

#[async_trait]
pub trait DriverSearchAPI {
    async fn find_nearest_drivers(
        &self,
        user: User,
        query: NearestQuery,
    ) -> Result<Vec<NearbyDriver>, Error>;
}

pub trait API: RideAPI + BidAPI + DriverLocationAPI + DriverSearchAPI {}
