use axum::extract::{Extension, Json, Path, Query};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Coordinates, DriverPosition, NearbyDriver};
use crate::error::Error;
use crate::geo::NearestQuery;
use crate::server::DynAPI;

pub async fn update_location(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(coordinates): Json<Coordinates>,
) -> Result<Json<DriverPosition>, Error> {
    let position = api.update_driver_location(user, id, coordinates).await?;

    Ok(position.into())
}

pub async fn remove_location(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Error> {
    api.remove_driver_location(user, id).await?;

    Ok(StatusCode::OK)
}

pub async fn nearest(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(query): Query<NearestQuery>,
) -> Result<Json<Vec<NearbyDriver>>, Error> {
    let drivers = api.find_nearest_drivers(user, query).await?;

    Ok(drivers.into())
}
