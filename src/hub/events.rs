use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{ChatMessage, Coordinates};
use crate::error::Error;

/// Frames a client may send. Anything else is dropped.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Location(LocationUpdate),
    Message { text: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl LocationUpdate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            heading: None,
            speed: None,
        }
    }

    pub fn coordinates(&self) -> Result<Coordinates, Error> {
        Coordinates::new(self.lat, self.lng)
    }
}

/// Frames the hub pushes to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Location {
        driver_id: Uuid,
        lat: f64,
        lng: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        message_id: Uuid,
        user_id: Uuid,
        text: String,
        created_at: DateTime<Utc>,
    },
}

impl ServerEvent {
    pub fn location(driver_id: Uuid, update: LocationUpdate) -> Self {
        ServerEvent::Location {
            driver_id,
            lat: update.lat,
            lng: update.lng,
            heading: update.heading,
            speed: update.speed,
            timestamp: Utc::now(),
        }
    }
}

impl From<ChatMessage> for ServerEvent {
    fn from(message: ChatMessage) -> Self {
        ServerEvent::Message {
            message_id: message.id,
            user_id: message.user_id,
            text: message.text,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frames() {
        let frame: Inbound =
            serde_json::from_str(r#"{"type":"location","lat":55.75,"lng":37.61,"speed":12.5}"#)
                .unwrap();
        assert_eq!(
            frame,
            Inbound::Location(LocationUpdate {
                lat: 55.75,
                lng: 37.61,
                heading: None,
                speed: Some(12.5),
            })
        );

        let frame: Inbound = serde_json::from_str(r#"{"type":"message","text":"hi"}"#).unwrap();
        assert_eq!(frame, Inbound::Message { text: "hi".into() });

        assert!(serde_json::from_str::<Inbound>(r#"{"type":"typing"}"#).is_err());
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"location","lat":"north"}"#).is_err());
        assert!(serde_json::from_str::<Inbound>("not json").is_err());
    }

    #[test]
    fn outbound_frames_use_camel_case() {
        let driver_id = Uuid::new_v4();
        let event = ServerEvent::location(driver_id, LocationUpdate::new(1.0, 2.0));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "location");
        assert_eq!(value["driverId"], driver_id.to_string());
        assert!(value.get("heading").is_none());
        assert!(value.get("timestamp").is_some());

        let message = ChatMessage::new(Uuid::new_v4(), driver_id, "on my way".into()).unwrap();
        let value = serde_json::to_value(ServerEvent::from(message.clone())).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["userId"], driver_id.to_string());
        assert_eq!(value["messageId"], message.id.to_string());
        assert_eq!(value["text"], "on my way");
        assert!(value.get("createdAt").is_some());
    }
}
