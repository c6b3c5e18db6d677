//! 领域模型错误定义
//!
//! 定义了聊天中继中所有可能的业务错误与存储错误，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 输入参数不合法（调用方错误，不需要重试）
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 参与者名称已被占用
    #[error("participant name already taken: {0}")]
    NameTaken(String),

    /// 参与者不存在
    #[error("participant not found: {0}")]
    ParticipantNotFound(String),

    /// 发送者未登记或已过期
    #[error("sender not registered: {0}")]
    SenderNotRegistered(String),

    /// 消息类型不合法（status 不能由用户发送）
    #[error("invalid message type: {0}")]
    InvalidMessageType(String),

    /// 分页数量不合法
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
