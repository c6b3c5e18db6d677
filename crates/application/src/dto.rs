use domain::{Message, MessageType, Participant, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: Timestamp,
}

impl From<&Participant> for ParticipantDto {
    fn from(participant: &Participant) -> Self {
        Self {
            name: participant.name.as_str().to_owned(),
            last_seen_at: participant.last_seen_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub text: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// `HH:MM:SS`
    pub time: String,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::from(message.id),
            from: message.from.as_str().to_owned(),
            to: message.to.as_str().to_owned(),
            text: message.text.as_str().to_owned(),
            message_type: message.message_type,
            time: message.display_time(),
        }
    }
}
