use super::Engine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::DriverLocationAPI,
    auth::User,
    entities::{Coordinates, DriverPosition},
    error::{forbidden_error, Error},
};

#[async_trait]
impl DriverLocationAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn update_driver_location(
        &self,
        user: User,
        driver_id: Uuid,
        coordinates: Coordinates,
    ) -> Result<DriverPosition, Error> {
        self.authorize(user, "report_location", driver_id.to_string(), forbidden_error())?;

        self.geo.update_position(driver_id, coordinates).await
    }

    #[tracing::instrument(skip(self))]
    async fn remove_driver_location(&self, user: User, driver_id: Uuid) -> Result<(), Error> {
        self.authorize(user, "report_location", driver_id.to_string(), forbidden_error())?;

        self.geo.remove_driver(driver_id).await?;

        tracing::info!(driver_id = %driver_id, "driver went offline");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DriverSearchAPI;
    use crate::engine::tests::{driver, engine, passenger};
    use crate::geo::NearestQuery;

    #[test]
    fn drivers_manage_only_their_own_position() {
        tokio_test::block_on(async {
            let (engine, _events) = engine();
            let me = driver();
            let other = driver();
            let here = Coordinates::new(55.75, 37.61).unwrap();

            engine
                .update_driver_location(me.clone(), me.id, here)
                .await
                .unwrap();

            let err = engine
                .update_driver_location(me.clone(), other.id, here)
                .await
                .unwrap_err();
            assert_eq!(err, forbidden_error());

            let err = engine
                .update_driver_location(passenger(), me.id, here)
                .await
                .unwrap_err();
            assert_eq!(err, forbidden_error());

            let err = engine
                .update_driver_location(me.clone(), me.id, Coordinates { lat: 0.0, lng: 181.0 })
                .await
                .unwrap_err();
            assert!(err.is_validation_error());

            let found = engine
                .find_nearest_drivers(passenger(), NearestQuery::new(55.75, 37.61))
                .await
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].driver_id, me.id);
            assert!(found[0].distance_km < 1e-6);

            let err = engine
                .remove_driver_location(other.clone(), me.id)
                .await
                .unwrap_err();
            assert_eq!(err, forbidden_error());

            engine.remove_driver_location(me.clone(), me.id).await.unwrap();
            let found = engine
                .find_nearest_drivers(passenger(), NearestQuery::new(55.75, 37.61))
                .await
                .unwrap();
            assert!(found.is_empty());
        });
    }
}
