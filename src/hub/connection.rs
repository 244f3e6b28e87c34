use async_channel::{Receiver, Sender, TrySendError};
use serde::Deserialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::events::{Inbound, LocationUpdate, ServerEvent};
use super::room::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Driver,
    Passenger,
    /// A chat participant, whichever side of the ride they are on.
    Member,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Passenger => "passenger",
            Role::Member => "member",
        }
    }
}

/// Why the hub closed, or refused, a connection. The codes travel in the
/// WebSocket close frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CloseReason {
    #[error("missing ride id")]
    MissingRideId,
    #[error("missing role")]
    MissingRole,
    #[error("missing identity")]
    MissingIdentity,
    #[error("identity mismatch")]
    IdentityMismatch,
    #[error("slow consumer")]
    SlowConsumer,
    #[error("room closed")]
    RoomClosed,
}

impl CloseReason {
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::MissingRideId => 4000,
            CloseReason::MissingRole => 4001,
            CloseReason::MissingIdentity => 4002,
            CloseReason::IdentityMismatch => 4003,
            CloseReason::SlowConsumer => 4008,
            CloseReason::RoomClosed => 4010,
        }
    }
}

/// Raw WebSocket query parameters, before validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JoinParams {
    pub ride_id: Option<String>,
    pub role: Option<String>,
    pub driver_id: Option<String>,
    pub passenger_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    pub ride_id: Uuid,
    pub role: Role,
    pub user_id: Uuid,
}

fn parse_id(value: Option<&str>, missing: CloseReason) -> Result<Uuid, CloseReason> {
    value
        .filter(|value| !value.is_empty())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or(missing)
}

impl JoinParams {
    /// Validates a tracking join: `role` plus the matching identity.
    pub fn tracking(&self) -> Result<JoinRequest, CloseReason> {
        let ride_id = parse_id(self.ride_id.as_deref(), CloseReason::MissingRideId)?;

        let (role, identity) = match self.role.as_deref() {
            Some("driver") => (Role::Driver, self.driver_id.as_deref()),
            Some("passenger") => (Role::Passenger, self.passenger_id.as_deref()),
            _ => return Err(CloseReason::MissingRole),
        };

        Ok(JoinRequest {
            ride_id,
            role,
            user_id: parse_id(identity, CloseReason::MissingIdentity)?,
        })
    }

    pub fn chat(&self) -> Result<JoinRequest, CloseReason> {
        Ok(JoinRequest {
            ride_id: parse_id(self.ride_id.as_deref(), CloseReason::MissingRideId)?,
            role: Role::Member,
            user_id: parse_id(self.user_id.as_deref(), CloseReason::MissingIdentity)?,
        })
    }
}

/// The room's end of a connection.
#[derive(Debug)]
pub(crate) struct Connection {
    pub id: u64,
    pub role: Role,
    pub user_id: Uuid,
    outbox: Sender<ServerEvent>,
    closed: Option<oneshot::Sender<CloseReason>>,
}

pub(crate) enum Delivery {
    Sent,
    Full,
    Gone,
}

impl Connection {
    pub fn new(
        id: u64,
        request: &JoinRequest,
        outbox: Sender<ServerEvent>,
        closed: oneshot::Sender<CloseReason>,
    ) -> Self {
        Self {
            id,
            role: request.role,
            user_id: request.user_id,
            outbox,
            closed: Some(closed),
        }
    }

    /// Never waits: a full outbox is reported back to the room.
    pub fn deliver(&self, event: ServerEvent) -> Delivery {
        match self.outbox.try_send(event) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    pub fn close(mut self, reason: CloseReason) {
        if let Some(closed) = self.closed.take() {
            let _ = closed.send(reason);
        }
        self.outbox.close();
    }
}

/// The client's end of a connection. Dropping it leaves the room.
#[derive(Debug)]
pub struct Session {
    id: u64,
    events: Receiver<ServerEvent>,
    closed: oneshot::Receiver<CloseReason>,
    sender: SessionSender,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        events: Receiver<ServerEvent>,
        closed: oneshot::Receiver<CloseReason>,
        commands: Sender<Command>,
    ) -> Self {
        Self {
            id,
            events,
            closed,
            sender: SessionSender { id, commands },
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// A handle for feeding inbound frames while another task drains events.
    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// Next event for this connection. Once the room lets go of the
    /// connection, buffered events are still handed out before the close
    /// reason.
    pub async fn next(&mut self) -> Result<ServerEvent, CloseReason> {
        match self.events.recv().await {
            Ok(event) => Ok(event),
            Err(_) => Err(self.closed.try_recv().unwrap_or(CloseReason::RoomClosed)),
        }
    }

    /// Like `next`, without waiting.
    pub fn try_next(&mut self) -> Option<ServerEvent> {
        self.events.try_recv().ok()
    }

    pub async fn send_location(&self, update: LocationUpdate) {
        self.sender.send_location(update).await
    }

    pub async fn send_chat(&self, text: impl Into<String>) {
        self.sender.send_chat(text).await
    }

    pub fn leave(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.sender.commands.try_send(Command::Leave {
            connection_id: self.id,
        });
    }
}

#[derive(Clone, Debug)]
pub struct SessionSender {
    id: u64,
    commands: Sender<Command>,
}

impl SessionSender {
    pub async fn handle(&self, inbound: Inbound) {
        match inbound {
            Inbound::Location(update) => self.send_location(update).await,
            Inbound::Message { text } => self.send_chat(text).await,
        }
    }

    pub async fn send_location(&self, update: LocationUpdate) {
        self.dispatch(Command::Location {
            connection_id: self.id,
            update,
        })
        .await
    }

    pub async fn send_chat(&self, text: impl Into<String>) {
        self.dispatch(Command::Chat {
            connection_id: self.id,
            text: text.into(),
        })
        .await
    }

    async fn dispatch(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            tracing::debug!(connection_id = self.id, "room is gone, dropping frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> JoinParams {
        let mut params = JoinParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "ride_id" => params.ride_id = value,
                "role" => params.role = value,
                "driver_id" => params.driver_id = value,
                "passenger_id" => params.passenger_id = value,
                "user_id" => params.user_id = value,
                _ => unreachable!(),
            }
        }
        params
    }

    #[test]
    fn tracking_params() {
        let ride = Uuid::new_v4().to_string();
        let user = Uuid::new_v4().to_string();

        let request = params(&[("ride_id", &ride), ("role", "driver"), ("driver_id", &user)])
            .tracking()
            .unwrap();
        assert_eq!(request.role, Role::Driver);
        assert_eq!(request.user_id.to_string(), user);

        let request = params(&[("ride_id", &ride), ("role", "passenger"), ("passenger_id", &user)])
            .tracking()
            .unwrap();
        assert_eq!(request.role, Role::Passenger);

        assert_eq!(
            params(&[("role", "driver"), ("driver_id", &user)]).tracking(),
            Err(CloseReason::MissingRideId)
        );
        assert_eq!(
            params(&[("ride_id", "nope"), ("role", "driver"), ("driver_id", &user)]).tracking(),
            Err(CloseReason::MissingRideId)
        );
        assert_eq!(
            params(&[("ride_id", &ride), ("driver_id", &user)]).tracking(),
            Err(CloseReason::MissingRole)
        );
        assert_eq!(
            params(&[("ride_id", &ride), ("role", "admin"), ("driver_id", &user)]).tracking(),
            Err(CloseReason::MissingRole)
        );
        // a driver must name itself through driver_id
        assert_eq!(
            params(&[("ride_id", &ride), ("role", "driver"), ("passenger_id", &user)]).tracking(),
            Err(CloseReason::MissingIdentity)
        );
    }

    #[test]
    fn chat_params() {
        let ride = Uuid::new_v4().to_string();
        let user = Uuid::new_v4().to_string();

        let request = params(&[("ride_id", &ride), ("user_id", &user)]).chat().unwrap();
        assert_eq!(request.role, Role::Member);

        assert_eq!(
            params(&[("user_id", &user)]).chat(),
            Err(CloseReason::MissingRideId)
        );
        assert_eq!(
            params(&[("ride_id", &ride), ("user_id", "")]).chat(),
            Err(CloseReason::MissingIdentity)
        );
    }

    #[test]
    fn close_codes() {
        let codes: Vec<u16> = [
            CloseReason::MissingRideId,
            CloseReason::MissingRole,
            CloseReason::MissingIdentity,
            CloseReason::IdentityMismatch,
            CloseReason::SlowConsumer,
            CloseReason::RoomClosed,
        ]
        .iter()
        .map(CloseReason::code)
        .collect();

        assert_eq!(codes, vec![4000, 4001, 4002, 4003, 4008, 4010]);
        assert_eq!(CloseReason::SlowConsumer.to_string(), "slow consumer");
    }
}
