//! 内存实现的参与者登记表与消息日志
//!
//! 默认存储后端，也用于测试。写操作都在单个写锁内完成，保证
//! "不存在才插入" 与序号分配的原子性。

use std::collections::{hash_map::Entry, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    expiry_cutoff, is_visible, Message, MessageLimit, Participant, ParticipantName,
    RepositoryError, RetentionPolicy, Timestamp,
};
use tokio::sync::RwLock;

use crate::repository::{MessageLog, ParticipantStore};

#[derive(Default)]
pub struct MemoryParticipantStore {
    participants: RwLock<HashMap<ParticipantName, Participant>>,
}

impl MemoryParticipantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParticipantStore for MemoryParticipantStore {
    async fn register(&self, participant: Participant) -> Result<Participant, RepositoryError> {
        let mut participants = self.participants.write().await;
        match participants.entry(participant.name.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => Ok(slot.insert(participant).clone()),
        }
    }

    async fn heartbeat(
        &self,
        name: &ParticipantName,
        now: Timestamp,
    ) -> Result<Participant, RepositoryError> {
        let mut participants = self.participants.write().await;
        let participant = participants.get_mut(name).ok_or(RepositoryError::NotFound)?;
        participant.touch(now);
        Ok(participant.clone())
    }

    async fn find(&self, name: &ParticipantName) -> Result<Option<Participant>, RepositoryError> {
        Ok(self.participants.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Participant>, RepositoryError> {
        Ok(self.participants.read().await.values().cloned().collect())
    }

    async fn remove(&self, name: &ParticipantName) -> Result<bool, RepositoryError> {
        Ok(self.participants.write().await.remove(name).is_some())
    }

    async fn expired(
        &self,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let Some(cutoff) = expiry_cutoff(now, ttl) else {
            return Ok(Vec::new());
        };
        let participants = self.participants.read().await;
        Ok(participants
            .values()
            .filter(|p| p.last_seen_at <= cutoff)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct LogState {
    next_seq: u64,
    entries: VecDeque<(u64, Message)>,
}

#[derive(Default)]
pub struct MemoryMessageLog {
    state: RwLock<LogState>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn append(&self, message: Message) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        state.next_seq += 1;
        let seq = state.next_seq;
        state.entries.push_back((seq, message));
        Ok(seq)
    }

    async fn query(
        &self,
        viewer: Option<&str>,
        limit: Option<MessageLimit>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let visible = |message: &&Message| is_visible(message, viewer);
        let messages = state.entries.iter().map(|(_, message)| message);

        let result = match limit {
            Some(limit) => messages
                .rev()
                .filter(visible)
                .take(limit.get())
                .cloned()
                .collect(),
            None => messages.filter(visible).cloned().collect(),
        };
        Ok(result)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.state.read().await.entries.len() as u64)
    }

    async fn apply_retention(
        &self,
        policy: RetentionPolicy,
        now: Timestamp,
    ) -> Result<u64, RepositoryError> {
        if policy.is_keep_all() {
            return Ok(0);
        }

        let mut state = self.state.write().await;
        let before = state.entries.len();

        if let Some(cutoff) = policy.age_cutoff(now) {
            state.entries.retain(|(_, message)| message.sent_at >= cutoff);
        }
        if let Some(max) = policy.max_messages {
            while state.entries.len() > max {
                state.entries.pop_front();
            }
        }

        Ok((before - state.entries.len()) as u64)
    }
}
