use super::Engine;

use async_trait::async_trait;

use crate::{
    api::DriverSearchAPI,
    auth::{Platform, User},
    entities::NearbyDriver,
    error::{forbidden_error, Error},
    geo::NearestQuery,
};

#[async_trait]
impl DriverSearchAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_nearest_drivers(
        &self,
        user: User,
        query: NearestQuery,
    ) -> Result<Vec<NearbyDriver>, Error> {
        self.authorize(user, "find_drivers", Platform, forbidden_error())?;

        let drivers = self.geo.find_nearest(query).await?;

        tracing::debug!("found {} drivers", drivers.len());

        Ok(drivers)
    }
}

#[test]
fn search_requires_a_known_role() {
    use uuid::Uuid;

    tokio_test::block_on(async {
        let (engine, _events) = super::tests::engine();
        let nobody = User {
            id: Uuid::new_v4(),
            roles: vec![],
        };

        let err = engine
            .find_nearest_drivers(nobody, NearestQuery::new(0.0, 0.0))
            .await
            .unwrap_err();
        assert_eq!(err, forbidden_error());

        let err = engine
            .find_nearest_drivers(User::driver(Uuid::new_v4()), NearestQuery::new(95.0, 0.0))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    });
}
