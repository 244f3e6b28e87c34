use super::helpers::list_limit;
use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::RideAPI,
    auth::{Platform, User},
    entities::{Place, Ride, RideStatus},
    error::{forbidden_error, invalid_status_error, not_driver_error, Error},
    events::Event,
    store::RideFilter,
};

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_ride(
        &self,
        user: User,
        origin: Place,
        destination: Place,
    ) -> Result<Ride, Error> {
        let ride = Ride::new(user.id, origin, destination)?;

        self.authorize(user.clone(), "create_ride", Platform, forbidden_error())?;

        self.rides.insert_ride(&ride).await?;

        tracing::info!(ride_id = %ride.id, "ride requested");

        self.publisher
            .publish(Event::RideRequested { ride: ride.clone() })
            .await;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let ride = self.fetch_ride(id).await?;

        self.authorize(user, "read", ride.clone(), forbidden_error())?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(
        &self,
        user: User,
        id: Uuid,
        status: RideStatus,
    ) -> Result<Ride, Error> {
        let ride = self.fetch_ride(id).await?;

        if !status.is_requestable() || !ride.status.can_transition_to(status) {
            return Err(invalid_status_error());
        }

        let (action, denied) = match status {
            RideStatus::InProgress => ("start", not_driver_error()),
            RideStatus::Completed => ("complete", not_driver_error()),
            _ => ("cancel", forbidden_error()),
        };

        // participants never change once a ride has left bidding, so the
        // snapshot is good enough to authorize against
        self.authorize(user, action, ride.clone(), denied)?;

        let from = ride.status;
        let updated = self
            .rides
            .update_ride(id, Box::new(move |ride: &mut Ride| ride.update_status(status)))
            .await?;

        tracing::info!(ride_id = %id, from = from.name(), to = status.name(), "ride status changed");

        self.publisher
            .publish(Event::StatusChanged {
                ride_id: id,
                from,
                to: updated.status,
            })
            .await;

        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn list_open_rides(&self, user: User, limit: Option<i64>) -> Result<Vec<Ride>, Error> {
        self.authorize(user, "list_open_rides", Platform, forbidden_error())?;

        self.rides
            .list_rides(RideFilter::Open, list_limit(limit))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides_by_passenger(
        &self,
        user: User,
        passenger_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Ride>, Error> {
        self.authorize(user, "list_rides", passenger_id.to_string(), forbidden_error())?;

        self.rides
            .list_rides(RideFilter::Passenger(passenger_id), list_limit(limit))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides_by_driver(
        &self,
        user: User,
        driver_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Ride>, Error> {
        self.authorize(user, "list_rides", driver_id.to_string(), forbidden_error())?;

        self.rides
            .list_rides(RideFilter::Driver(driver_id), list_limit(limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BidAPI;
    use crate::engine::tests::{destination, driver, engine, origin, passenger};
    use crate::error::{not_driver_error, ride_not_found_error};

    #[test]
    fn create_ride_validates_coordinates_and_role() {
        tokio_test::block_on(async {
            let (engine, events) = engine();
            let passenger = passenger();

            let ride = engine
                .create_ride(passenger.clone(), origin(), destination())
                .await
                .unwrap();
            assert_eq!(ride.status, RideStatus::Requested);
            assert_eq!(ride.passenger_id, passenger.id);
            assert_eq!(events.recv().await.unwrap().name(), "ride.requested");

            for (lat, lng) in [(90.5, 0.0), (-91.0, 0.0), (0.0, 180.01), (0.0, -200.0)] {
                let err = engine
                    .create_ride(passenger.clone(), Place::new(lat, lng, None), destination())
                    .await
                    .unwrap_err();
                assert!(err.is_validation_error(), "{} {}", lat, lng);
            }

            for (lat, lng) in [(90.0, 180.0), (-90.0, -180.0), (0.0, 0.0)] {
                engine
                    .create_ride(passenger.clone(), Place::new(lat, lng, None), destination())
                    .await
                    .unwrap();
            }

            let err = engine
                .create_ride(driver(), origin(), destination())
                .await
                .unwrap_err();
            assert_eq!(err, forbidden_error());
        });
    }

    #[test]
    fn find_ride_visibility() {
        tokio_test::block_on(async {
            let (engine, _events) = engine();
            let owner = passenger();

            let ride = engine
                .create_ride(owner.clone(), origin(), destination())
                .await
                .unwrap();

            assert_eq!(engine.find_ride(owner, ride.id).await.unwrap().id, ride.id);
            assert!(engine.find_ride(driver(), ride.id).await.is_ok());

            let err = engine.find_ride(passenger(), ride.id).await.unwrap_err();
            assert_eq!(err, forbidden_error());

            let err = engine
                .find_ride(User::new_system_user(), Uuid::new_v4())
                .await
                .unwrap_err();
            assert_eq!(err, ride_not_found_error());
        });
    }

    #[test]
    fn status_transitions_are_gated() {
        tokio_test::block_on(async {
            let (engine, _events) = engine();
            let owner = passenger();
            let assigned = driver();

            let ride = engine
                .create_ride(owner.clone(), origin(), destination())
                .await
                .unwrap();

            // requested -> completed is never legal, whoever asks
            let err = engine
                .update_status(owner.clone(), ride.id, RideStatus::Completed)
                .await
                .unwrap_err();
            assert_eq!(err, invalid_status_error());

            let err = engine
                .update_status(owner.clone(), ride.id, RideStatus::Matched)
                .await
                .unwrap_err();
            assert_eq!(err, invalid_status_error());

            let bid = engine.place_bid(assigned.clone(), ride.id, 400).await.unwrap();
            engine
                .accept_bid(owner.clone(), ride.id, bid.id)
                .await
                .unwrap();

            let err = engine
                .update_status(owner.clone(), ride.id, RideStatus::InProgress)
                .await
                .unwrap_err();
            assert_eq!(err, not_driver_error());

            let err = engine
                .update_status(driver(), ride.id, RideStatus::InProgress)
                .await
                .unwrap_err();
            assert_eq!(err, not_driver_error());

            let ride = engine
                .update_status(assigned.clone(), ride.id, RideStatus::InProgress)
                .await
                .unwrap();
            assert_eq!(ride.status, RideStatus::InProgress);

            let ride = engine
                .update_status(assigned.clone(), ride.id, RideStatus::Completed)
                .await
                .unwrap();
            assert_eq!(ride.status, RideStatus::Completed);

            let err = engine
                .update_status(owner, ride.id, RideStatus::Cancelled)
                .await
                .unwrap_err();
            assert_eq!(err, invalid_status_error());
        });
    }

    #[test]
    fn cancellation_by_participants_only() {
        tokio_test::block_on(async {
            let (engine, events) = engine();
            let owner = passenger();

            let ride = engine
                .create_ride(owner.clone(), origin(), destination())
                .await
                .unwrap();
            events.recv().await.unwrap();

            let err = engine
                .update_status(driver(), ride.id, RideStatus::Cancelled)
                .await
                .unwrap_err();
            assert_eq!(err, forbidden_error());

            let ride = engine
                .update_status(owner, ride.id, RideStatus::Cancelled)
                .await
                .unwrap();
            assert_eq!(ride.status, RideStatus::Cancelled);

            match events.recv().await.unwrap() {
                Event::StatusChanged { from, to, .. } => {
                    assert_eq!(from, RideStatus::Requested);
                    assert_eq!(to, RideStatus::Cancelled);
                }
                other => panic!("unexpected event {:?}", other),
            }
        });
    }

    #[test]
    fn listings() {
        tokio_test::block_on(async {
            let (engine, _events) = engine();
            let owner = passenger();
            let assigned = driver();

            let mut ids = vec![];
            for _ in 0..3 {
                let ride = engine
                    .create_ride(owner.clone(), origin(), destination())
                    .await
                    .unwrap();
                ids.push(ride.id);
            }

            let bid = engine.place_bid(assigned.clone(), ids[0], 100).await.unwrap();
            engine.accept_bid(owner.clone(), ids[0], bid.id).await.unwrap();

            let open = engine.list_open_rides(driver(), None).await.unwrap();
            assert_eq!(open.len(), 2);
            assert!(open.iter().all(|ride| ride.is_open()));

            let err = engine.list_open_rides(owner.clone(), None).await.unwrap_err();
            assert_eq!(err, forbidden_error());

            let mine = engine
                .list_rides_by_passenger(owner.clone(), owner.id, Some(2))
                .await
                .unwrap();
            assert_eq!(mine.len(), 2);

            let err = engine
                .list_rides_by_passenger(passenger(), owner.id, None)
                .await
                .unwrap_err();
            assert_eq!(err, forbidden_error());

            let driving = engine
                .list_rides_by_driver(assigned.clone(), assigned.id, None)
                .await
                .unwrap();
            assert_eq!(driving.len(), 1);
            assert_eq!(driving[0].id, ids[0]);
        });
    }
}
