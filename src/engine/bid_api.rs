use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::BidAPI,
    auth::User,
    entities::{Bid, Ride},
    error::{forbidden_error, not_passenger_error, Error},
    events::Event,
};

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn place_bid(&self, user: User, ride_id: Uuid, price: i64) -> Result<Bid, Error> {
        let bid = Bid::new(ride_id, user.id, price)?;

        let ride = self.fetch_ride(ride_id).await?;
        self.authorize(user, "bid", ride, forbidden_error())?;

        // the ride is locked while it moves to bidding and the bid is written
        let ride = self
            .rides
            .insert_bid(&bid, Box::new(|ride: &mut Ride| ride.open_bidding()))
            .await?;

        tracing::info!(ride_id = %ride.id, bid_id = %bid.id, price = bid.price, "bid placed");

        self.publisher
            .publish(Event::BidPlaced { bid: bid.clone() })
            .await;

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(&self, user: User, ride_id: Uuid) -> Result<Vec<Bid>, Error> {
        let ride = self.fetch_ride(ride_id).await?;
        self.authorize(user, "read", ride, forbidden_error())?;

        self.rides.list_bids(ride_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, ride_id: Uuid, bid_id: Uuid) -> Result<Ride, Error> {
        let ride = self.fetch_ride(ride_id).await?;
        self.authorize(user, "accept_bid", ride, not_passenger_error())?;

        let ride = self
            .rides
            .accept_bid(
                ride_id,
                bid_id,
                Box::new(|ride: &mut Ride, bid: &Bid| ride.assign(bid)),
            )
            .await?;

        tracing::info!(ride_id = %ride.id, bid_id = %bid_id, "ride matched");

        self.publisher
            .publish(Event::RideMatched {
                ride: ride.clone(),
                bid_id,
            })
            .await;

        Ok(ride)
    }
}
