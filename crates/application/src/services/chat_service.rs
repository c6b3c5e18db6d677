use std::sync::Arc;

use domain::{
    DomainError, Message, MessageId, MessageLimit, MessageText, MessageType, Participant,
    ParticipantName, Recipient, RepositoryError,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{MessageLog, ParticipantStore},
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub from: String,
    pub to: String,
    pub text: String,
    pub message_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListMessagesRequest {
    /// 查看者名称，不要求是在线参与者
    pub viewer: Option<String>,
    /// 原始的 limit 参数，交由领域层校验
    pub limit: Option<String>,
}

pub struct ChatServiceDependencies {
    pub participant_store: Arc<dyn ParticipantStore>,
    pub message_log: Arc<dyn MessageLog>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 登记参与者并广播进入通知。
    ///
    /// 登记与通知是两步操作：通知失败时参与者依然保持登记状态，错误返回给调用方。
    pub async fn join(&self, name: &str) -> Result<Participant, ApplicationError> {
        let name = ParticipantName::parse(name)?;
        let now = self.deps.clock.now();

        let participant = self
            .deps
            .participant_store
            .register(Participant::register(name.clone(), now))
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => {
                    ApplicationError::from(DomainError::NameTaken(name.to_string()))
                }
                other => ApplicationError::from(other),
            })?;

        let announcement = Message::joined(MessageId::generate(), name.clone(), now);
        if let Err(err) = self.deps.message_log.append(announcement).await {
            tracing::error!(
                participant = %name,
                error = %err,
                "参与者已登记，但进入通知写入失败"
            );
            return Err(err.into());
        }

        tracing::info!(participant = %name, "参与者进入聊天室");
        Ok(participant)
    }

    pub async fn list_participants(&self) -> Result<Vec<Participant>, ApplicationError> {
        Ok(self.deps.participant_store.list().await?)
    }

    pub async fn send(&self, request: SendMessageRequest) -> Result<Message, ApplicationError> {
        let message_type = MessageType::parse_user_authored(&request.message_type)?;
        let sender = ParticipantName::parse(request.from.as_str())
            .map_err(|_| DomainError::SenderNotRegistered(request.from.clone()))?;
        let to = Recipient::parse(&request.to)?;
        let text = MessageText::new(request.text)?;
        let now = self.deps.clock.now();

        let message = Message::new(MessageId::generate(), sender.clone(), to, text, message_type, now)?;

        // 检查发送者在线与刷新活跃时间在同一个存储操作中完成
        self.deps
            .participant_store
            .heartbeat(&sender, now)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => {
                    ApplicationError::from(DomainError::SenderNotRegistered(sender.to_string()))
                }
                other => ApplicationError::from(other),
            })?;

        let seq = self.deps.message_log.append(message.clone()).await?;

        tracing::debug!(
            from = %message.from,
            to = %message.to,
            message_type = %message.message_type,
            seq,
            "消息已写入日志"
        );

        Ok(message)
    }

    pub async fn list_messages(
        &self,
        request: ListMessagesRequest,
    ) -> Result<Vec<Message>, ApplicationError> {
        let limit = request
            .limit
            .as_deref()
            .map(MessageLimit::parse)
            .transpose()?;

        Ok(self
            .deps
            .message_log
            .query(request.viewer.as_deref(), limit)
            .await?)
    }

    pub async fn heartbeat(&self, name: &str) -> Result<Participant, ApplicationError> {
        let participant_name = ParticipantName::parse(name)
            .map_err(|_| DomainError::ParticipantNotFound(name.to_owned()))?;
        let now = self.deps.clock.now();

        self.deps
            .participant_store
            .heartbeat(&participant_name, now)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => ApplicationError::from(
                    DomainError::ParticipantNotFound(participant_name.to_string()),
                ),
                other => ApplicationError::from(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use domain::{RetentionPolicy, Timestamp, JOINED_TEXT};
    use time::macros::datetime;

    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::{MemoryMessageLog, MemoryParticipantStore};
    use crate::repository::MockParticipantStore;

    struct Harness {
        service: Arc<ChatService>,
        clock: Arc<ManualClock>,
        participants: Arc<MemoryParticipantStore>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(datetime!(2024-01-01 12:00:00 UTC)));
        let participants = Arc::new(MemoryParticipantStore::new());
        let service = Arc::new(ChatService::new(ChatServiceDependencies {
            participant_store: participants.clone(),
            message_log: Arc::new(MemoryMessageLog::new()),
            clock: clock.clone(),
        }));
        Harness {
            service,
            clock,
            participants,
        }
    }

    fn send(from: &str, to: &str, text: &str, kind: &str) -> SendMessageRequest {
        SendMessageRequest {
            from: from.into(),
            to: to.into(),
            text: text.into(),
            message_type: kind.into(),
        }
    }

    fn viewer(name: &str) -> ListMessagesRequest {
        ListMessagesRequest {
            viewer: Some(name.into()),
            limit: None,
        }
    }

    #[tokio::test]
    async fn join_registers_and_announces() {
        let h = harness();

        let participant = h.service.join("alice").await.unwrap();
        assert_eq!(participant.name.as_str(), "alice");

        let log = h.service.list_messages(viewer("bob")).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message_type, MessageType::Status);
        assert_eq!(log[0].from.as_str(), "alice");
        assert_eq!(log[0].to, Recipient::Everyone);
        assert_eq!(log[0].text.as_str(), JOINED_TEXT);
    }

    #[tokio::test]
    async fn duplicate_join_is_name_taken() {
        let h = harness();
        h.service.join("alice").await.unwrap();

        let err = h.service.join("alice").await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::NameTaken(ref name)) if name == "alice"
        ));
    }

    #[tokio::test]
    async fn blank_name_is_validation_error() {
        let h = harness();
        let err = h.service.join("   ").await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::InvalidArgument { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_have_exactly_one_winner() {
        let h = harness();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move { service.join("alice").await })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for task in futures::future::join_all(tasks).await {
            match task.unwrap() {
                Ok(_) => successes += 1,
                Err(ApplicationError::Domain(DomainError::NameTaken(_))) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 49);
        // 只有一条进入通知
        let log = h.service.list_messages(ListMessagesRequest::default()).await.unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let h = harness();

        h.service.join("alice").await.unwrap();
        assert!(h.service.join("alice").await.is_err());
        h.service
            .send(send("alice", "Todos", "hi", "broadcast"))
            .await
            .unwrap();

        // bob 从未登记，依然能看到状态消息和广播
        let seen_by_bob = h.service.list_messages(viewer("bob")).await.unwrap();
        assert_eq!(seen_by_bob.len(), 2);
        assert_eq!(seen_by_bob[0].message_type, MessageType::Status);
        assert_eq!(seen_by_bob[1].message_type, MessageType::Broadcast);
        assert_eq!(seen_by_bob[1].text.as_str(), "hi");
    }

    #[tokio::test]
    async fn private_messages_are_only_visible_to_both_ends() {
        let h = harness();
        h.service.join("alice").await.unwrap();
        h.service.join("bob").await.unwrap();
        h.service
            .send(send("alice", "bob", "secret", "private"))
            .await
            .unwrap();

        let has_secret = |messages: &[Message]| messages.iter().any(|m| m.text.as_str() == "secret");

        assert!(has_secret(&h.service.list_messages(viewer("alice")).await.unwrap()));
        assert!(has_secret(&h.service.list_messages(viewer("bob")).await.unwrap()));
        assert!(!has_secret(&h.service.list_messages(viewer("carol")).await.unwrap()));
        assert!(!has_secret(
            &h.service
                .list_messages(ListMessagesRequest::default())
                .await
                .unwrap()
        ));
    }

    #[tokio::test]
    async fn send_requires_live_sender() {
        let h = harness();
        let err = h
            .service
            .send(send("ghost", "Todos", "boo", "broadcast"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::SenderNotRegistered(ref name)) if name == "ghost"
        ));
        let log = h.service.list_messages(ListMessagesRequest::default()).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn send_rejects_status_and_unknown_types() {
        let h = harness();
        h.service.join("alice").await.unwrap();

        for kind in ["status", "shout", ""] {
            let err = h
                .service
                .send(send("alice", "Todos", "hi", kind))
                .await
                .unwrap_err();
            assert!(
                matches!(err, ApplicationError::Domain(DomainError::InvalidMessageType(_))),
                "type {kind:?} gave {err}"
            );
        }
    }

    #[tokio::test]
    async fn send_rejects_empty_text_and_private_broadcast() {
        let h = harness();
        h.service.join("alice").await.unwrap();

        let empty = h.service.send(send("alice", "Todos", "  ", "broadcast")).await;
        assert!(matches!(
            empty,
            Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
        ));

        let private_to_all = h.service.send(send("alice", "Todos", "hi", "private")).await;
        assert!(matches!(
            private_to_all,
            Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
        ));
    }

    #[tokio::test]
    async fn send_refreshes_sender_liveness() {
        let h = harness();
        h.service.join("alice").await.unwrap();
        h.clock.advance(Duration::from_secs(8));

        h.service
            .send(send("alice", "Todos", "still here", "message"))
            .await
            .unwrap();

        let alice = h
            .participants
            .find(&ParticipantName::parse("alice").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.last_seen_at, datetime!(2024-01-01 12:00:08 UTC));
    }

    #[tokio::test]
    async fn heartbeat_unknown_is_not_found() {
        let h = harness();
        let err = h.service.heartbeat("nobody").await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::ParticipantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn heartbeat_updates_last_seen() {
        let h = harness();
        h.service.join("alice").await.unwrap();
        h.clock.advance(Duration::from_secs(5));

        let alice = h.service.heartbeat("alice").await.unwrap();
        assert_eq!(alice.last_seen_at, datetime!(2024-01-01 12:00:05 UTC));
    }

    #[tokio::test]
    async fn limit_semantics() {
        let h = harness();
        h.service.join("alice").await.unwrap();
        for text in ["first", "second", "third"] {
            h.service
                .send(send("alice", "Todos", text, "broadcast"))
                .await
                .unwrap();
        }

        let latest = h
            .service
            .list_messages(ListMessagesRequest {
                viewer: Some("bob".into()),
                limit: Some("2".into()),
            })
            .await
            .unwrap();
        let texts: Vec<_> = latest.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["third", "second"]);

        let full = h.service.list_messages(viewer("bob")).await.unwrap();
        let texts: Vec<_> = full.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, [JOINED_TEXT, "first", "second", "third"]);

        for bad in ["0", "-1", "lots"] {
            let err = h
                .service
                .list_messages(ListMessagesRequest {
                    viewer: Some("bob".into()),
                    limit: Some(bad.into()),
                })
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ApplicationError::Domain(DomainError::InvalidLimit(_))
            ));
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_insertion_order() {
        let h = harness();
        h.service.join("alice").await.unwrap();
        let sent: Vec<String> = (0..25).map(|i| format!("msg-{i}")).collect();
        for text in &sent {
            h.service
                .send(send("alice", "Todos", text, "broadcast"))
                .await
                .unwrap();
        }

        let log = h.service.list_messages(viewer("alice")).await.unwrap();
        let received: Vec<_> = log
            .iter()
            .filter(|m| m.message_type == MessageType::Broadcast)
            .map(|m| m.text.as_str().to_owned())
            .collect();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn storage_fault_on_register_is_surfaced() {
        let mut store = MockParticipantStore::new();
        store
            .expect_register()
            .returning(|_| Err(RepositoryError::storage("connection reset")));

        let service = ChatService::new(ChatServiceDependencies {
            participant_store: Arc::new(store),
            message_log: Arc::new(MemoryMessageLog::new()),
            clock: Arc::new(ManualClock::new(datetime!(2024-01-01 12:00:00 UTC))),
        });

        let err = service.join("alice").await.unwrap_err();
        assert!(err.is_transient());
    }

    struct BrokenLog;

    #[async_trait]
    impl MessageLog for BrokenLog {
        async fn append(&self, _message: Message) -> Result<u64, RepositoryError> {
            Err(RepositoryError::storage("log unavailable"))
        }

        async fn query(
            &self,
            _viewer: Option<&str>,
            _limit: Option<MessageLimit>,
        ) -> Result<Vec<Message>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<u64, RepositoryError> {
            Ok(0)
        }

        async fn apply_retention(
            &self,
            _policy: RetentionPolicy,
            _now: Timestamp,
        ) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn failed_announcement_keeps_participant_joined() {
        let participants = Arc::new(MemoryParticipantStore::new());
        let service = ChatService::new(ChatServiceDependencies {
            participant_store: participants.clone(),
            message_log: Arc::new(BrokenLog),
            clock: Arc::new(ManualClock::new(datetime!(2024-01-01 12:00:00 UTC))),
        });

        let err = service.join("alice").await.unwrap_err();
        assert!(matches!(err, ApplicationError::Repository(RepositoryError::Storage { .. })));

        let listed = service.list_participants().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name.as_str(), "alice");
    }
}
