//! Domain events published by the engine for out-of-process collaborators
//! such as notification delivery.

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Bid, Ride, RideStatus};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "ride.requested")]
    RideRequested { ride: Ride },
    #[serde(rename = "bid.placed")]
    BidPlaced { bid: Bid },
    #[serde(rename = "ride.matched")]
    RideMatched { ride: Ride, bid_id: Uuid },
    #[serde(rename = "status.changed")]
    StatusChanged {
        ride_id: Uuid,
        from: RideStatus,
        to: RideStatus,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RideRequested { .. } => "ride.requested",
            Event::BidPlaced { .. } => "bid.placed",
            Event::RideMatched { .. } => "ride.matched",
            Event::StatusChanged { .. } => "status.changed",
        }
    }

    pub fn ride_id(&self) -> Uuid {
        match self {
            Event::RideRequested { ride } | Event::RideMatched { ride, .. } => ride.id,
            Event::BidPlaced { bid } => bid.ride_id,
            Event::StatusChanged { ride_id, .. } => *ride_id,
        }
    }
}

/// Publishing is fire and forget. A publisher that cannot deliver logs and
/// moves on; it never fails the operation that produced the event.
#[async_trait]
pub trait EventPublisher {
    async fn publish(&self, event: Event);
}

pub type DynEventPublisher = Arc<dyn EventPublisher + Send + Sync>;

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: Event) {
        tracing::info!(event = event.name(), ride_id = %event.ride_id(), "published event");
    }
}

/// Hands events to an in-process consumer over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelPublisher {
    sender: Sender<Event>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, Receiver<Event>) {
        let (sender, receiver) = async_channel::unbounded();

        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: Event) {
        let name = event.name();

        if self.sender.send(event).await.is_err() {
            tracing::warn!(event = name, "event receiver dropped");
        }
    }
}

#[test]
fn events_serialize_with_dotted_type() {
    let event = Event::StatusChanged {
        ride_id: Uuid::nil(),
        from: RideStatus::Matched,
        to: RideStatus::InProgress,
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "status.changed");
    assert_eq!(value["from"], "matched");
    assert_eq!(value["to"], "in_progress");
}

#[test]
fn channel_publisher_delivers_in_order() {
    tokio_test::block_on(async {
        let (publisher, receiver) = ChannelPublisher::new();

        for to in [RideStatus::InProgress, RideStatus::Completed] {
            publisher
                .publish(Event::StatusChanged {
                    ride_id: Uuid::nil(),
                    from: RideStatus::Matched,
                    to,
                })
                .await;
        }

        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::StatusChanged { to: RideStatus::InProgress, .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::StatusChanged { to: RideStatus::Completed, .. }
        ));

        drop(receiver);
        // a closed channel is logged, not an error
        publisher
            .publish(Event::StatusChanged {
                ride_id: Uuid::nil(),
                from: RideStatus::Matched,
                to: RideStatus::Cancelled,
            })
            .await;
    });
}
