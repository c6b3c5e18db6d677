use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;
use crate::value_objects::{
    MessageId, MessageText, ParticipantName, Timestamp, BROADCAST_RECIPIENT,
};

/// 进入聊天室时系统发出的状态文本
pub const JOINED_TEXT: &str = "entra na sala...";
/// 被清理出聊天室时系统发出的状态文本
pub const LEFT_TEXT: &str = "sai da sala...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Broadcast,
    Private,
    /// 系统生成的进入/离开通知
    Status,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Broadcast => "broadcast",
            MessageType::Private => "private",
            MessageType::Status => "status",
        }
    }

    /// 解析用户提交的消息类型，`status` 只能由系统产生。
    pub fn parse_user_authored(value: &str) -> Result<Self, DomainError> {
        match value.parse()? {
            MessageType::Status => Err(DomainError::InvalidMessageType(value.to_owned())),
            kind => Ok(kind),
        }
    }
}

impl FromStr for MessageType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "broadcast" | "message" => Ok(MessageType::Broadcast),
            "private" | "private_message" => Ok(MessageType::Private),
            "status" => Ok(MessageType::Status),
            other => Err(DomainError::InvalidMessageType(other.to_owned())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 消息接收方：所有人，或者某个具体的参与者。
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Recipient {
    Everyone,
    Participant(ParticipantName),
}

impl Recipient {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("to", "cannot be empty"));
        }
        if trimmed == BROADCAST_RECIPIENT {
            return Ok(Recipient::Everyone);
        }
        ParticipantName::parse(trimmed).map(Recipient::Participant)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Recipient::Everyone => BROADCAST_RECIPIENT,
            Recipient::Participant(name) => name.as_str(),
        }
    }

    pub fn is_participant(&self, name: &str) -> bool {
        matches!(self, Recipient::Participant(p) if p.as_str() == name)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Recipient {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        value.as_str().to_owned()
    }
}

/// 不可变的聊天消息，一经写入日志就不再修改。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: ParticipantName,
    pub to: Recipient,
    pub text: MessageText,
    pub message_type: MessageType,
    pub sent_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        from: ParticipantName,
        to: Recipient,
        text: MessageText,
        message_type: MessageType,
        sent_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if message_type == MessageType::Private && to == Recipient::Everyone {
            return Err(DomainError::invalid_argument(
                "to",
                "private message needs a participant recipient",
            ));
        }
        Ok(Self {
            id,
            from,
            to,
            text,
            message_type,
            sent_at,
        })
    }

    pub fn joined(id: MessageId, name: ParticipantName, at: Timestamp) -> Self {
        Self::status(id, name, JOINED_TEXT, at)
    }

    pub fn left(id: MessageId, name: ParticipantName, at: Timestamp) -> Self {
        Self::status(id, name, LEFT_TEXT, at)
    }

    fn status(id: MessageId, name: ParticipantName, text: &str, at: Timestamp) -> Self {
        Self {
            id,
            from: name,
            to: Recipient::Everyone,
            text: MessageText(text.to_owned()),
            message_type: MessageType::Status,
            sent_at: at,
        }
    }

    /// `HH:MM:SS` 形式的展示时间
    pub fn display_time(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.sent_at.hour(),
            self.sent_at.minute(),
            self.sent_at.second()
        )
    }
}
