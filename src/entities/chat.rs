use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Returns `None` for blank text, which is never stored.
    pub fn new(ride_id: Uuid, user_id: Uuid, text: String) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            ride_id,
            user_id,
            text,
            created_at: Utc::now(),
        })
    }
}

#[test]
fn blank_text_is_not_a_message() {
    let ride_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    assert!(ChatMessage::new(ride_id, user_id, "".into()).is_none());
    assert!(ChatMessage::new(ride_id, user_id, " \n\t ".into()).is_none());
    assert_eq!(
        ChatMessage::new(ride_id, user_id, " hi ".into()).unwrap().text,
        " hi "
    );
}
