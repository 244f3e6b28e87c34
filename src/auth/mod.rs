mod authenticator;
pub mod authorizor;
mod platform;
mod user;

pub use authenticator::{Authenticator, DevAuthenticator, DynAuthenticator};
pub use platform::Platform;
pub use user::{User, DRIVER_ROLE, PASSENGER_ROLE, SYSTEM_ROLE};
