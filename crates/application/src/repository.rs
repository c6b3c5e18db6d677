use std::time::Duration;

use async_trait::async_trait;
use domain::{
    Message, MessageLimit, Participant, ParticipantName, RepositoryError, RetentionPolicy,
    Timestamp,
};

/// 参与者登记表
///
/// 所有写操作都必须是单操作原子的，调用方不会跨多个操作持有锁。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    // 名称已存在时返回 `RepositoryError::Conflict`，并发登记同名时只有一个成功
    async fn register(&self, participant: Participant) -> Result<Participant, RepositoryError>;

    // 刷新最后活跃时间，不存在时返回 `RepositoryError::NotFound`
    async fn heartbeat(
        &self,
        name: &ParticipantName,
        now: Timestamp,
    ) -> Result<Participant, RepositoryError>;

    async fn find(&self, name: &ParticipantName) -> Result<Option<Participant>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Participant>, RepositoryError>;

    // 幂等删除，返回是否真的删掉了一条记录
    async fn remove(&self, name: &ParticipantName) -> Result<bool, RepositoryError>;

    // 所有满足 `now - last_seen_at >= ttl` 的参与者快照
    async fn expired(
        &self,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<Vec<Participant>, RepositoryError>;
}

/// 只追加的消息日志
#[async_trait]
pub trait MessageLog: Send + Sync {
    // 追加到末尾，返回分配的序号；序号严格递增
    async fn append(&self, message: Message) -> Result<u64, RepositoryError>;

    // 无 limit 时按时间正序返回全部可见消息；
    // 有 limit 时只返回最近 limit 条可见消息，且按时间倒序（最新在前）
    async fn query(
        &self,
        viewer: Option<&str>,
        limit: Option<MessageLimit>,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    // 按保留策略清理旧消息，返回清理条数
    async fn apply_retention(
        &self,
        policy: RetentionPolicy,
        now: Timestamp,
    ) -> Result<u64, RepositoryError>;
}
