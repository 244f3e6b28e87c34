mod bid;
mod chat;
mod location;
mod position;
mod ride;

pub use bid::{sort_bids, Bid, Status as BidStatus};
pub use chat::ChatMessage;
pub use location::{Coordinates, Place};
pub use position::{DriverPosition, NearbyDriver};
pub use ride::{Assignment, Ride, Status as RideStatus};
