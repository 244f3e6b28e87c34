use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_price_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub price: i64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl Bid {
    pub fn new(ride_id: Uuid, driver_id: Uuid, price: i64) -> Result<Self, Error> {
        if price <= 0 {
            return Err(invalid_price_error());
        }

        Ok(Bid {
            id: Uuid::new_v4(),
            ride_id,
            driver_id,
            price,
            status: Status::Pending,
            created_at: Utc::now(),
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }
}

/// Presentation order for bid lists: cheapest first, earliest first among
/// equal prices, then by id so the order is total.
pub fn sort_bids(bids: &mut [Bid]) {
    bids.sort_by(|a, b| {
        a.price
            .cmp(&b.price)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

#[test]
fn price_must_be_positive() {
    let ride_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    assert!(Bid::new(ride_id, driver_id, 0).unwrap_err().is_validation_error());
    assert!(Bid::new(ride_id, driver_id, -5).unwrap_err().is_validation_error());
    assert!(Bid::new(ride_id, driver_id, 1).unwrap().is_pending());
}

#[test]
fn sort_bids_orders_by_price_then_submission() {
    let ride_id = Uuid::new_v4();

    let first = Bid::new(ride_id, Uuid::new_v4(), 500).unwrap();
    let mut second = Bid::new(ride_id, Uuid::new_v4(), 400).unwrap();
    let mut third = Bid::new(ride_id, Uuid::new_v4(), 400).unwrap();
    second.created_at = first.created_at + chrono::Duration::seconds(1);
    third.created_at = first.created_at + chrono::Duration::seconds(2);

    let mut bids = vec![third.clone(), first.clone(), second.clone()];
    sort_bids(&mut bids);

    let ids: Vec<Uuid> = bids.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![second.id, third.id, first.id]);
}
