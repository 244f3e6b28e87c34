use async_channel::Receiver;
use std::collections::HashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::connection::{CloseReason, Connection, Delivery, Role};
use super::events::{LocationUpdate, ServerEvent};
use crate::entities::ChatMessage;
use crate::geo::DynGeoIndex;
use crate::store::DynChatStore;

pub(crate) enum Command {
    Join {
        connection: Connection,
        reply: oneshot::Sender<Result<(), CloseReason>>,
    },
    Leave {
        connection_id: u64,
    },
    Location {
        connection_id: u64,
        update: LocationUpdate,
    },
    Chat {
        connection_id: u64,
        text: String,
    },
}

/// All live connections of one ride. A room is driven by a single task, so
/// its state needs no locking.
pub(crate) struct Room {
    ride_id: Uuid,
    connections: HashMap<u64, Connection>,
    driver_id: Option<Uuid>,
    passenger_id: Option<Uuid>,
    last_location: Option<ServerEvent>,
    chat: DynChatStore,
    geo: DynGeoIndex,
}

impl Room {
    pub fn new(ride_id: Uuid, chat: DynChatStore, geo: DynGeoIndex) -> Self {
        Self {
            ride_id,
            connections: HashMap::new(),
            driver_id: None,
            passenger_id: None,
            last_location: None,
            chat,
            geo,
        }
    }

    /// Runs until the command channel closes, then closes every remaining
    /// connection.
    #[tracing::instrument(name = "Room::run", skip_all, fields(ride_id = %self.ride_id))]
    pub async fn run(mut self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv().await {
            match command {
                Command::Join { connection, reply } => {
                    let result = self.join(connection);
                    let _ = reply.send(result);
                }
                Command::Leave { connection_id } => self.leave(connection_id),
                Command::Location {
                    connection_id,
                    update,
                } => self.location(connection_id, update).await,
                Command::Chat {
                    connection_id,
                    text,
                } => self.message(connection_id, text).await,
            }
        }

        for (_, connection) in self.connections.drain() {
            connection.close(CloseReason::RoomClosed);
        }

        tracing::info!("room closed");
    }

    fn join(&mut self, connection: Connection) -> Result<(), CloseReason> {
        let user_id = connection.user_id;

        match connection.role {
            Role::Driver => register(&mut self.driver_id, user_id)?,
            Role::Passenger => register(&mut self.passenger_id, user_id)?,
            Role::Member => {
                if let (Some(driver_id), Some(passenger_id)) = (self.driver_id, self.passenger_id) {
                    if user_id != driver_id && user_id != passenger_id {
                        return Err(CloseReason::IdentityMismatch);
                    }
                }
            }
        }

        if connection.role == Role::Passenger {
            if let Some(event) = self.last_location.clone() {
                let _ = connection.deliver(event);
            }
        }

        tracing::info!(
            connection_id = connection.id,
            role = connection.role.name(),
            user_id = %user_id,
            "joined"
        );

        self.connections.insert(connection.id, connection);

        Ok(())
    }

    fn leave(&mut self, connection_id: u64) {
        if self.connections.remove(&connection_id).is_some() {
            tracing::info!(connection_id, "left");
        }
    }

    async fn location(&mut self, connection_id: u64, update: LocationUpdate) {
        let driver_id = match self.connections.get(&connection_id) {
            Some(connection)
                if connection.role == Role::Driver
                    && Some(connection.user_id) == self.driver_id =>
            {
                connection.user_id
            }
            _ => {
                tracing::warn!(connection_id, "location from a non-driver connection dropped");
                return;
            }
        };

        let coordinates = match update.coordinates() {
            Ok(coordinates) => coordinates,
            Err(_) => {
                tracing::warn!(connection_id, "location with invalid coordinates dropped");
                return;
            }
        };

        let event = ServerEvent::location(driver_id, update);
        self.last_location = Some(event.clone());
        self.broadcast(event, |connection| connection.role == Role::Passenger);

        // passengers never wait on the index
        if let Err(err) = self.geo.update_position(driver_id, coordinates).await {
            tracing::error!(driver_id = %driver_id, "failed to refresh geo index: {}", err);
        }
    }

    async fn message(&mut self, connection_id: u64, text: String) {
        let user_id = match self.connections.get(&connection_id) {
            Some(connection) => connection.user_id,
            None => return,
        };

        let message = match ChatMessage::new(self.ride_id, user_id, text) {
            Some(message) => message,
            None => return,
        };

        if let Err(err) = self.chat.insert_message(&message).await {
            tracing::error!(connection_id, "failed to persist chat message: {}", err);
            return;
        }

        self.broadcast(message.into(), |connection| connection.id != connection_id);
    }

    /// Delivers `event` to every connection accepted by `filter`. Connections
    /// that cannot keep up are evicted; connections whose client is gone are
    /// forgotten.
    fn broadcast<F>(&mut self, event: ServerEvent, filter: F)
    where
        F: Fn(&Connection) -> bool,
    {
        let mut evicted = vec![];
        let mut gone = vec![];

        for connection in self.connections.values().filter(|c| filter(*c)) {
            match connection.deliver(event.clone()) {
                Delivery::Sent => {}
                Delivery::Full => evicted.push(connection.id),
                Delivery::Gone => gone.push(connection.id),
            }
        }

        for id in evicted {
            if let Some(connection) = self.connections.remove(&id) {
                tracing::info!(connection_id = id, "evicting slow consumer");
                connection.close(CloseReason::SlowConsumer);
            }
        }

        for id in gone {
            self.connections.remove(&id);
        }
    }
}

/// The first identity claiming a role owns it for the life of the room.
fn register(slot: &mut Option<Uuid>, user_id: Uuid) -> Result<(), CloseReason> {
    match slot {
        Some(registered) if *registered != user_id => Err(CloseReason::IdentityMismatch),
        Some(_) => Ok(()),
        None => {
            *slot = Some(user_id);
            Ok(())
        }
    }
}

#[test]
fn first_identity_owns_the_role() {
    let first = Uuid::new_v4();
    let mut slot = None;

    assert_eq!(register(&mut slot, first), Ok(()));
    assert_eq!(register(&mut slot, first), Ok(()));
    assert_eq!(
        register(&mut slot, Uuid::new_v4()),
        Err(CloseReason::IdentityMismatch)
    );
    assert_eq!(slot, Some(first));
}
