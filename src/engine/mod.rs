mod bid_api;
mod driver_location_api;
mod driver_search_api;
mod helpers;
mod ride_api;

use oso::Oso;

use crate::{
    api::API,
    auth::authorizor,
    error::Error,
    events::DynEventPublisher,
    geo::DynGeoIndex,
    store::DynRideStore,
};

pub use helpers::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// The matching engine. Owns no state of its own: rides and bids live in the
/// store, positions in the geo index.
pub struct Engine {
    rides: DynRideStore,
    geo: DynGeoIndex,
    publisher: DynEventPublisher,
    authorizor: Oso,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(
        rides: DynRideStore,
        geo: DynGeoIndex,
        publisher: DynEventPublisher,
    ) -> Result<Self, Error> {
        Ok(Self {
            rides,
            geo,
            publisher,
            authorizor: authorizor::new()?,
        })
    }
}

impl Engine {
    /// Fails with `denied` unless the policy allows `actor` to perform
    /// `action` on `resource`.
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
        denied: Error,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(denied)
    }
}

impl API for Engine {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::User;
    use crate::entities::Place;
    use crate::events::{ChannelPublisher, Event};
    use crate::geo::MemoryGeoIndex;
    use crate::store::MemoryStore;
    use async_channel::Receiver;
    use std::sync::Arc;
    use uuid::Uuid;

    pub fn engine() -> (Engine, Receiver<Event>) {
        let (publisher, events) = ChannelPublisher::new();
        let engine = Engine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryGeoIndex::new(None)),
            Arc::new(publisher),
        )
        .unwrap();

        (engine, events)
    }

    pub fn origin() -> Place {
        Place::new(55.75, 37.61, Some("Red Square".into()))
    }

    pub fn destination() -> Place {
        Place::new(55.76, 37.62, None)
    }

    pub fn passenger() -> User {
        User::passenger(Uuid::new_v4())
    }

    pub fn driver() -> User {
        User::driver(Uuid::new_v4())
    }
}
