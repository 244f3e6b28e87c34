use uuid::Uuid;

use super::Engine;
use crate::{
    entities::Ride,
    error::{ride_not_found_error, Error},
};

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

/// Absent or non-positive limits mean the default.
pub fn list_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(limit) if limit > 0 => limit.min(MAX_LIST_LIMIT),
        _ => DEFAULT_LIST_LIMIT,
    }
}

impl Engine {
    pub(super) async fn fetch_ride(&self, id: Uuid) -> Result<Ride, Error> {
        self.rides
            .find_ride(id)
            .await?
            .ok_or_else(ride_not_found_error)
    }
}

#[test]
fn list_limits() {
    assert_eq!(list_limit(None), DEFAULT_LIST_LIMIT);
    assert_eq!(list_limit(Some(0)), DEFAULT_LIST_LIMIT);
    assert_eq!(list_limit(Some(-5)), DEFAULT_LIST_LIMIT);
    assert_eq!(list_limit(Some(7)), 7);
    assert_eq!(list_limit(Some(1000)), MAX_LIST_LIMIT);
}
