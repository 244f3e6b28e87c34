use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::user::{User, DRIVER_ROLE, PASSENGER_ROLE, SYSTEM_ROLE};
use crate::error::{unauthorized_error, Error};

/// Turns a bearer token into the identity of its holder. Token issuance lives
/// outside this service.
#[async_trait]
pub trait Authenticator {
    async fn authenticate(&self, token: &str) -> Result<User, Error>;
}

pub type DynAuthenticator = Arc<dyn Authenticator + Send + Sync>;

/// Accepts `<role>:<user id>` tokens verbatim. For local development and
/// tests only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevAuthenticator;

#[async_trait]
impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<User, Error> {
        let (role, id) = token.split_once(':').ok_or_else(unauthorized_error)?;

        if ![PASSENGER_ROLE, DRIVER_ROLE, SYSTEM_ROLE].contains(&role) {
            return Err(unauthorized_error());
        }

        let id = Uuid::parse_str(id).map_err(|_| unauthorized_error())?;

        Ok(User::new(id, role))
    }
}

#[test]
fn dev_tokens() {
    use tokio_test::block_on;

    let id = Uuid::new_v4();
    let user = block_on(DevAuthenticator.authenticate(&format!("driver:{}", id))).unwrap();
    assert_eq!(user, User::driver(id));

    let err = block_on(DevAuthenticator.authenticate(&id.to_string())).unwrap_err();
    assert_eq!(err, unauthorized_error());

    let err = block_on(DevAuthenticator.authenticate(&format!("admin:{}", id))).unwrap_err();
    assert_eq!(err, unauthorized_error());

    let err = block_on(DevAuthenticator.authenticate("passenger:not-a-uuid")).unwrap_err();
    assert_eq!(err, unauthorized_error());
}
