use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BidAcceptance, ChatStore, RideFilter, RideMutation, RideStore};
use crate::{
    entities::{sort_bids, Bid, BidStatus, ChatMessage, Ride},
    error::{bid_not_found_error, ride_not_found_error, Error},
};

/// In-process store. Every ride mutation runs under one lock, which gives
/// the same atomicity as the row locks of `PgStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rides: Mutex<Rides>,
    chat: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

#[derive(Debug, Default)]
struct Rides {
    rides: HashMap<Uuid, Ride>,
    bids: HashMap<Uuid, Vec<Bid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        self.rides.lock().await.rides.insert(ride.id, ride.clone());

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        Ok(self.rides.lock().await.rides.get(&id).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides(&self, filter: RideFilter, limit: i64) -> Result<Vec<Ride>, Error> {
        let tables = self.rides.lock().await;

        let mut rides: Vec<Ride> = tables
            .rides
            .values()
            .filter(|ride| match filter {
                RideFilter::Open => ride.is_open(),
                RideFilter::Passenger(id) => ride.passenger_id == id,
                RideFilter::Driver(id) => ride.driver_id() == Some(id),
            })
            .cloned()
            .collect();

        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rides.truncate(limit.max(0) as usize);

        Ok(rides)
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn update_ride(&self, id: Uuid, mutation: RideMutation) -> Result<Ride, Error> {
        let mut tables = self.rides.lock().await;

        let stored = tables.rides.get_mut(&id).ok_or_else(ride_not_found_error)?;
        let mut ride = stored.clone();

        mutation(&mut ride)?;
        *stored = ride.clone();

        Ok(ride)
    }

    #[tracing::instrument(skip(self, bid, mutation), fields(ride_id = %bid.ride_id, bid_id = %bid.id))]
    async fn insert_bid(&self, bid: &Bid, mutation: RideMutation) -> Result<Ride, Error> {
        let mut tables = self.rides.lock().await;

        let stored = tables
            .rides
            .get_mut(&bid.ride_id)
            .ok_or_else(ride_not_found_error)?;
        let mut ride = stored.clone();

        mutation(&mut ride)?;
        *stored = ride.clone();

        tables
            .bids
            .entry(bid.ride_id)
            .or_default()
            .push(bid.clone());

        Ok(ride)
    }

    #[tracing::instrument(skip(self, acceptance))]
    async fn accept_bid(
        &self,
        ride_id: Uuid,
        bid_id: Uuid,
        acceptance: BidAcceptance,
    ) -> Result<Ride, Error> {
        let mut guard = self.rides.lock().await;
        let tables = &mut *guard;

        let stored = tables
            .rides
            .get_mut(&ride_id)
            .ok_or_else(ride_not_found_error)?;
        let bids = tables.bids.entry(ride_id).or_default();
        let bid = bids
            .iter()
            .find(|bid| bid.id == bid_id)
            .ok_or_else(bid_not_found_error)?;

        let mut ride = stored.clone();
        acceptance(&mut ride, bid)?;
        *stored = ride.clone();

        for bid in bids.iter_mut() {
            if bid.id == bid_id {
                bid.status = BidStatus::Accepted;
            } else if bid.is_pending() {
                bid.status = BidStatus::Rejected;
            }
        }

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(&self, ride_id: Uuid) -> Result<Vec<Bid>, Error> {
        let mut bids = self
            .rides
            .lock()
            .await
            .bids
            .get(&ride_id)
            .cloned()
            .unwrap_or_default();

        sort_bids(&mut bids);

        Ok(bids)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    #[tracing::instrument(skip(self, message), fields(ride_id = %message.ride_id))]
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), Error> {
        self.chat
            .lock()
            .await
            .entry(message.ride_id)
            .or_default()
            .push(message.clone());

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_messages(&self, ride_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>, Error> {
        let chat = self.chat.lock().await;
        let messages = chat.get(&ride_id).map(Vec::as_slice).unwrap_or_default();

        let skip = messages.len().saturating_sub(limit.max(0) as usize);

        Ok(messages[skip..].to_vec())
    }
}
