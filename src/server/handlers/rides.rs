use axum::extract::{Extension, Json, Path, Query};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Bid, Place, Ride, RideStatus};
use crate::error::Error;
use crate::hub::Hub;
use crate::server::DynAPI;

#[derive(Deserialize)]
pub struct CreateParams {
    origin: Place,
    destination: Place,
}

#[derive(Deserialize)]
pub struct ListParams {
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct BidParams {
    price: i64,
}

#[derive(Deserialize)]
pub struct AcceptParams {
    bid_id: Uuid,
}

#[derive(Deserialize)]
pub struct StatusParams {
    status: RideStatus,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<CreateParams>,
) -> Result<(StatusCode, Json<Ride>), Error> {
    let ride = api
        .create_ride(user, params.origin, params.destination)
        .await?;

    Ok((StatusCode::CREATED, ride.into()))
}

pub async fn available(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.list_open_rides(user, params.limit).await?;

    Ok(rides.into())
}

/// Rides the caller drives when they hold the driver role, rides they
/// requested otherwise.
pub async fn mine(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Ride>>, Error> {
    let id = user.id;
    let rides = if user.is_driver() {
        api.list_rides_by_driver(user, id, params.limit).await?
    } else {
        api.list_rides_by_passenger(user, id, params.limit).await?
    };

    Ok(rides.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn place_bid(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<BidParams>,
) -> Result<(StatusCode, Json<Bid>), Error> {
    let bid = api.place_bid(user, id, params.price).await?;

    Ok((StatusCode::CREATED, bid.into()))
}

pub async fn list_bids(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api.list_bids(user, id).await?;

    Ok(bids.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<AcceptParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.accept_bid(user, id, params.bid_id).await?;

    Ok(ride.into())
}

#[axum_macros::debug_handler]
pub async fn update_status(
    Extension(api): Extension<DynAPI>,
    Extension(hub): Extension<Arc<Hub>>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<StatusParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.update_status(user, id, params.status).await?;

    if ride.status.is_terminal() {
        hub.cleanup(ride.id).await;
    }

    Ok(ride.into())
}
