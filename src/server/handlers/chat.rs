use axum::extract::{Extension, Json, Path, Query};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::ChatMessage;
use crate::error::Error;
use crate::hub::Hub;
use crate::server::DynAPI;

#[derive(Deserialize)]
pub struct HistoryParams {
    limit: Option<i64>,
}

/// Chat history is visible to whoever may read the ride.
pub async fn history(
    Extension(api): Extension<DynAPI>,
    Extension(hub): Extension<Arc<Hub>>,
    user: User,
    Path(ride_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatMessage>>, Error> {
    api.find_ride(user, ride_id).await?;

    let messages = hub.history(ride_id, params.limit).await?;

    Ok(messages.into())
}
