use std::time::Duration;

use crate::participant::checked_before;
use crate::value_objects::Timestamp;

/// 消息日志保留策略。
///
/// 默认保留全部消息；可以按条数和/或按时间限制日志大小，两个条件同时生效。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_messages: Option<usize>,
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    pub fn keep_all() -> Self {
        Self::default()
    }

    pub fn max_messages(count: usize) -> Self {
        Self {
            max_messages: Some(count),
            max_age: None,
        }
    }

    pub fn max_age(age: Duration) -> Self {
        Self {
            max_messages: None,
            max_age: Some(age),
        }
    }

    pub fn is_keep_all(&self) -> bool {
        self.max_messages.is_none() && self.max_age.is_none()
    }

    /// 早于该时间写入的消息应被清理；`max_age` 超出时间范围时不按时间清理
    pub fn age_cutoff(&self, now: Timestamp) -> Option<Timestamp> {
        self.max_age.and_then(|age| checked_before(now, age))
    }
}
