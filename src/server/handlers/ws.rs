//! WebSocket endpoints for the session hub.
//!
//! Client -> server:
//! ```json
//! {"type": "location", "lat": 55.75, "lng": 37.61, "heading": 90.0}
//! {"type": "message", "text": "on my way"}
//! ```
//!
//! Server -> client:
//! ```json
//! {"type": "location", "driverId": "...", "lat": 55.75, "lng": 37.61, "timestamp": "..."}
//! {"type": "message", "userId": "...", "text": "on my way", "messageId": "...", "createdAt": "..."}
//! ```

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;

use crate::auth::User;
use crate::error::Error;
use crate::hub::{CloseReason, Hub, Inbound, JoinParams, JoinRequest, Role};
use crate::server::DynAPI;

pub async fn tracking(
    ws: WebSocketUpgrade,
    Extension(api): Extension<DynAPI>,
    Extension(hub): Extension<Arc<Hub>>,
    user: User,
    Query(params): Query<JoinParams>,
) -> Result<Response, Error> {
    let request = params.tracking();
    let request = check(&api, user, request).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, request)))
}

pub async fn chat(
    ws: WebSocketUpgrade,
    Extension(api): Extension<DynAPI>,
    Extension(hub): Extension<Arc<Hub>>,
    user: User,
    Query(params): Query<JoinParams>,
) -> Result<Response, Error> {
    let request = params.chat();
    let request = check(&api, user, request).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, request)))
}

/// Callers may only join as themselves, in the role they hold on the ride.
/// Rides the caller cannot read are refused before the upgrade, finished
/// rides get no room.
async fn check(
    api: &DynAPI,
    user: User,
    request: Result<JoinRequest, CloseReason>,
) -> Result<Result<JoinRequest, CloseReason>, Error> {
    let request = match request {
        Ok(request) => request,
        Err(reason) => return Ok(Err(reason)),
    };

    if request.user_id != user.id {
        return Ok(Err(CloseReason::IdentityMismatch));
    }

    let ride = api.find_ride(user, request.ride_id).await?;
    if ride.status.is_terminal() {
        return Ok(Err(CloseReason::RoomClosed));
    }

    let holds_role = match request.role {
        Role::Driver => ride.driver_id() == Some(request.user_id),
        Role::Passenger => ride.passenger_id == request.user_id,
        Role::Member => ride.is_participant(request.user_id),
    };

    if !holds_role {
        return Ok(Err(CloseReason::IdentityMismatch));
    }

    Ok(Ok(request))
}

#[derive(Debug, PartialEq)]
enum Frame {
    Inbound(Inbound),
    Close,
    Skip,
}

/// Malformed and binary frames are logged and skipped, never fatal.
fn read_frame(connection_id: u64, message: Message) -> Frame {
    match message {
        Message::Text(text) => match serde_json::from_str::<Inbound>(&text) {
            Ok(inbound) => Frame::Inbound(inbound),
            Err(err) => {
                tracing::warn!(connection_id, "dropping malformed frame: {}", err);
                Frame::Skip
            }
        },
        Message::Binary(data) => {
            tracing::warn!(connection_id, len = data.len(), "dropping binary frame");
            Frame::Skip
        }
        Message::Close(_) => Frame::Close,
        Message::Ping(_) | Message::Pong(_) => Frame::Skip,
    }
}

fn close_frame(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: Cow::Owned(reason.to_string()),
    }))
}

/// Pumps hub events out to the socket on one task and inbound frames into
/// the hub on another. Whichever side finishes first ends the connection.
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<Hub>,
    request: Result<JoinRequest, CloseReason>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let joined = match request {
        Ok(request) => hub.join(request).await,
        Err(reason) => Err(reason),
    };

    let mut session = match joined {
        Ok(session) => session,
        Err(reason) => {
            tracing::warn!(code = reason.code(), "refusing connection: {}", reason);
            let _ = ws_sender.send(close_frame(reason)).await;
            return;
        }
    };

    let connection_id = session.id();
    let sender = session.sender();

    let mut send_task = tokio::spawn(async move {
        loop {
            match session.next().await {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::error!("failed to encode event: {}", err);
                            continue;
                        }
                    };

                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(reason) => {
                    tracing::info!(connection_id, code = reason.code(), "closing connection: {}", reason);
                    let _ = ws_sender.send(close_frame(reason)).await;
                    break;
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            match read_frame(connection_id, message) {
                Frame::Inbound(inbound) => sender.handle(inbound).await,
                Frame::Close => break,
                Frame::Skip => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}
