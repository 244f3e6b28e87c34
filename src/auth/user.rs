use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PASSENGER_ROLE: &str = "passenger";
pub const DRIVER_ROLE: &str = "driver";
pub const SYSTEM_ROLE: &str = "system";

/// The authenticated caller, as vouched for by an `Authenticator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: Uuid, role: &str) -> Self {
        Self {
            id,
            roles: vec![role.into()],
        }
    }

    pub fn passenger(id: Uuid) -> Self {
        Self::new(id, PASSENGER_ROLE)
    }

    pub fn driver(id: Uuid) -> Self {
        Self::new(id, DRIVER_ROLE)
    }

    pub fn new_system_user() -> Self {
        Self::new(Uuid::new_v4(), SYSTEM_ROLE)
    }

    pub fn has_role(&self, role: String) -> bool {
        self.roles.iter().any(|x| x == &role)
    }

    pub fn is_driver(&self) -> bool {
        self.has_role(DRIVER_ROLE.into())
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id.to_string())
            .add_attribute_getter("roles", |recv: &User| recv.roles.clone())
            .add_method("has_role", User::has_role)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}
