use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Bid, BidStatus, Place};
use crate::error::{
    bid_not_found_error, invalid_status_error, ride_not_bidding_error, Error,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub status: Status,
    pub origin: Place,
    pub destination: Place,
    #[serde(flatten)]
    pub assignment: Option<Assignment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The driver and price bound to a ride by an accepted bid. Kept as one value
/// so that a ride never carries one without the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub driver_id: Uuid,
    pub price: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Requested,
    Bidding,
    Matched,
    InProgress,
    Completed,
    Cancelled,
}

impl Status {
    pub const OPEN: [Status; 2] = [Status::Requested, Status::Bidding];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Bidding => "bidding",
            Self::Matched => "matched",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The complete lifecycle graph, including the transitions that only
    /// happen as a side effect of bidding and matching.
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;

        match (self, next) {
            (Requested, Bidding) => true,
            (Bidding, Matched) => true,
            (Matched, InProgress) => true,
            (InProgress, Completed) => true,
            (Requested | Bidding | Matched | InProgress, Cancelled) => true,
            _ => false,
        }
    }

    /// Targets a caller may ask for explicitly; the others are reached
    /// through bids.
    pub fn is_requestable(&self) -> bool {
        matches!(self, Self::InProgress | Self::Completed | Self::Cancelled)
    }
}

impl Ride {
    pub fn new(passenger_id: Uuid, origin: Place, destination: Place) -> Result<Self, Error> {
        origin.validate()?;
        destination.validate()?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            passenger_id,
            status: Status::Requested,
            origin,
            destination,
            assignment: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        self.assignment.map(|a| a.driver_id)
    }

    pub fn price(&self) -> Option<i64> {
        self.assignment.map(|a| a.price)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.passenger_id == user_id || self.driver_id() == Some(user_id)
    }

    /// Called whenever a bid is placed: a requested ride starts bidding, a
    /// bidding ride stays as it is.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn open_bidding(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Requested => {
                self.set_status(Status::Bidding);
                Ok(())
            }
            Status::Bidding => Ok(()),
            _ => Err(ride_not_bidding_error()),
        }
    }

    #[tracing::instrument(skip(self, bid), fields(ride_id = %self.id, bid_id = %bid.id))]
    pub fn assign(&mut self, bid: &Bid) -> Result<(), Error> {
        if bid.ride_id != self.id {
            return Err(bid_not_found_error());
        }

        if self.status != Status::Bidding || bid.status != BidStatus::Pending {
            return Err(ride_not_bidding_error());
        }

        self.assignment = Some(Assignment {
            driver_id: bid.driver_id,
            price: bid.price,
        });
        self.set_status(Status::Matched);

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn update_status(&mut self, next: Status) -> Result<(), Error> {
        if !next.is_requestable() || !self.status.can_transition_to(next) {
            return Err(invalid_status_error());
        }

        self.set_status(next);

        Ok(())
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

impl PolarClass for Ride {
    fn get_polar_class_builder() -> oso::ClassBuilder<Ride> {
        oso::Class::builder()
            .name("Ride")
            .add_attribute_getter("id", |recv: &Ride| recv.id.to_string())
            .add_attribute_getter("passenger_id", |recv: &Ride| recv.passenger_id.to_string())
            .add_attribute_getter("driver_id", |recv: &Ride| {
                recv.driver_id().map(|id| id.to_string()).unwrap_or_default()
            })
            .add_attribute_getter("status", |recv: &Ride| recv.status.name().to_string())
            .add_attribute_getter("is_open", |recv: &Ride| recv.is_open())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Ride::get_polar_class_builder();
        builder.build()
    }
}
