//! Real-time rooms, one per ride, carrying driver location to the passenger
//! and chat between both sides.
//!
//! Every room is an actor: a task that owns the room's connections and
//! consumes a bounded command queue. Each connection gets a bounded outbox;
//! rooms never wait on a client, so a client that stops reading is evicted
//! instead of stalling its room.

mod connection;
mod events;
mod room;

pub use connection::{CloseReason, JoinParams, JoinRequest, Role, Session, SessionSender};
pub use events::{Inbound, LocationUpdate, ServerEvent};

use async_channel::Sender;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::entities::ChatMessage;
use crate::error::Error;
use crate::geo::DynGeoIndex;
use crate::store::DynChatStore;
use connection::Connection;
use room::{Command, Room};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Events buffered per connection before it counts as a slow consumer.
    pub outbound_buffer: usize,
    /// Commands buffered per room.
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 32,
            command_buffer: 256,
        }
    }
}

struct RoomHandle {
    commands: Sender<Command>,
    task: JoinHandle<()>,
}

pub struct Hub {
    rooms: DashMap<Uuid, RoomHandle>,
    chat: DynChatStore,
    geo: DynGeoIndex,
    config: HubConfig,
    next_connection_id: AtomicU64,
}

impl Hub {
    pub fn new(chat: DynChatStore, geo: DynGeoIndex, config: HubConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            chat,
            geo,
            config,
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn spawn_room(&self, ride_id: Uuid) -> RoomHandle {
        let (commands, receiver) = async_channel::bounded(self.config.command_buffer.max(1));
        let room = Room::new(ride_id, self.chat.clone(), self.geo.clone());

        tracing::info!(ride_id = %ride_id, "opening room");

        RoomHandle {
            commands,
            task: tokio::spawn(room.run(receiver)),
        }
    }

    /// Adds a connection to the ride's room, opening the room if needed.
    #[tracing::instrument(skip(self))]
    pub async fn join(&self, request: JoinRequest) -> Result<Session, CloseReason> {
        let commands = self
            .rooms
            .entry(request.ride_id)
            .or_insert_with(|| self.spawn_room(request.ride_id))
            .commands
            .clone();

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (outbox, events) = async_channel::bounded(self.config.outbound_buffer.max(1));
        let (closed, closed_receiver) = oneshot::channel();
        let (reply, reply_receiver) = oneshot::channel();

        commands
            .send(Command::Join {
                connection: Connection::new(id, &request, outbox, closed),
                reply,
            })
            .await
            .map_err(|_| CloseReason::RoomClosed)?;

        reply_receiver
            .await
            .map_err(|_| CloseReason::RoomClosed)??;

        Ok(Session::new(id, events, closed_receiver, commands))
    }

    /// Discards the ride's room and closes its connections. Chat history is
    /// kept.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self, ride_id: Uuid) {
        if let Some((_, room)) = self.rooms.remove(&ride_id) {
            room.commands.close();

            if let Err(err) = room.task.await {
                tracing::error!("room task failed: {}", err);
            }
        }
    }

    /// Tears down every room.
    pub async fn shutdown(&self) {
        let ride_ids: Vec<Uuid> = self.rooms.iter().map(|entry| *entry.key()).collect();

        for ride_id in ride_ids {
            self.cleanup(ride_id).await;
        }

        tracing::info!("hub shut down");
    }

    /// The most recent chat messages of the ride, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn history(&self, ride_id: Uuid, limit: Option<i64>) -> Result<Vec<ChatMessage>, Error> {
        let limit = match limit {
            Some(limit) if limit > 0 => limit.min(MAX_HISTORY_LIMIT),
            _ => DEFAULT_HISTORY_LIMIT,
        };

        self.chat.list_messages(ride_id, limit).await
    }
}
