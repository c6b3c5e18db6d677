use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = OffsetDateTime;

/// 广播接收方标记，代表"所有人"。
pub const BROADCAST_RECIPIENT: &str = "Todos";

/// 消息唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MessageId> for Uuid {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

/// 经过验证的参与者名称。
///
/// 名称去除首尾空白后不能为空，且不能与广播标记重名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantName(String);

impl ParticipantName {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        if value == BROADCAST_RECIPIENT {
            return Err(DomainError::invalid_argument("name", "reserved name"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ParticipantName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ParticipantName> for String {
    fn from(value: ParticipantName) -> Self {
        value.0
    }
}

/// 消息正文，不能为空白。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageText(pub(crate) String);

impl MessageText {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument("text", "cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// "最近 N 条" 查询的数量，必须为正整数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimit(NonZeroUsize);

impl MessageLimit {
    /// 解析来自查询字符串的原始值，0、负数和非数字都视为输入错误。
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| DomainError::InvalidLimit(raw.to_owned()))?;
        Self::try_from(value)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<i64> for MessageLimit {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self)
            .ok_or_else(|| DomainError::InvalidLimit(value.to_string()))
    }
}
