//! Durable storage for rides, bids and chat messages.
//!
//! Stores hold no business rules of their own. Operations that must be atomic
//! take the domain mutation as a closure and run it while the ride is locked,
//! so the engine decides what changes and the store decides how it is made
//! atomic.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Bid, ChatMessage, Ride};
use crate::error::{invalid_config_error, Error};

/// Mutation applied to a locked ride. Returning an error aborts the whole
/// operation and leaves storage untouched.
pub type RideMutation = Box<dyn FnOnce(&mut Ride) -> Result<(), Error> + Send>;

/// Mutation applied to a locked ride together with the bid being accepted.
pub type BidAcceptance = Box<dyn FnOnce(&mut Ride, &Bid) -> Result<(), Error> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RideFilter {
    Open,
    Passenger(Uuid),
    Driver(Uuid),
}

#[async_trait]
pub trait RideStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;

    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;

    /// Newest rides first.
    async fn list_rides(&self, filter: RideFilter, limit: i64) -> Result<Vec<Ride>, Error>;

    /// Locks the ride, applies `mutation` and persists the result. Fails with
    /// ride-not-found when the ride does not exist.
    async fn update_ride(&self, id: Uuid, mutation: RideMutation) -> Result<Ride, Error>;

    /// Locks the bid's ride, applies `mutation` and inserts `bid` in the same
    /// transaction.
    async fn insert_bid(&self, bid: &Bid, mutation: RideMutation) -> Result<Ride, Error>;

    /// Locks the ride, applies `acceptance` with the referenced bid, marks the
    /// bid accepted and every other pending bid of the ride rejected. The ride
    /// write is conditioned on the status it had when locked, so of several
    /// concurrent acceptances at most one commits.
    async fn accept_bid(
        &self,
        ride_id: Uuid,
        bid_id: Uuid,
        acceptance: BidAcceptance,
    ) -> Result<Ride, Error>;

    async fn list_bids(&self, ride_id: Uuid) -> Result<Vec<Bid>, Error>;
}

#[async_trait]
pub trait ChatStore {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), Error>;

    /// The `limit` most recent messages of the ride, oldest first.
    async fn list_messages(&self, ride_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>, Error>;
}

pub type DynRideStore = Arc<dyn RideStore + Send + Sync>;
pub type DynChatStore = Arc<dyn ChatStore + Send + Sync>;

/// Builds the store registered under `name`: `memory` or `postgres`.
pub async fn backend(
    name: &str,
    pool: Option<Pool<Postgres>>,
) -> Result<(DynRideStore, DynChatStore), Error> {
    match name {
        "memory" => {
            let store = Arc::new(MemoryStore::new());
            let rides: DynRideStore = store.clone();
            let chat: DynChatStore = store;

            Ok((rides, chat))
        }
        "postgres" => {
            let pool = pool.ok_or_else(|| invalid_config_error("DATABASE_URL"))?;
            let store = Arc::new(PgStore::new(pool).await?);
            let rides: DynRideStore = store.clone();
            let chat: DynChatStore = store;

            Ok((rides, chat))
        }
        _ => Err(invalid_config_error("DROVER_STORE")),
    }
}

#[test]
fn backends_are_selected_by_name() {
    tokio_test::block_on(async {
        assert!(backend("memory", None).await.is_ok());

        let err = backend("postgres", None).await.err().unwrap();
        assert_eq!(err, invalid_config_error("DATABASE_URL"));

        let err = backend("mongo", None).await.err().unwrap();
        assert_eq!(err, invalid_config_error("DROVER_STORE"));
    });
}
