use std::time::Duration;

use application::{MessageLog, ParticipantStore};
use async_trait::async_trait;
use domain::{
    expiry_cutoff, Message, MessageId, MessageLimit, MessageText, MessageType, Participant,
    ParticipantName, Recipient, RepositoryError, RetentionPolicy, Timestamp,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    name: String,
    last_seen_at: OffsetDateTime,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        let name = ParticipantName::parse(value.name).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Participant {
            name,
            last_seen_at: value.last_seen_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender: String,
    recipient: String,
    body: String,
    message_type: String,
    sent_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let from =
            ParticipantName::parse(value.sender).map_err(|err| invalid_data(err.to_string()))?;
        let to = Recipient::parse(&value.recipient).map_err(|err| invalid_data(err.to_string()))?;
        let text = MessageText::new(value.body).map_err(|err| invalid_data(err.to_string()))?;
        let message_type = value
            .message_type
            .parse::<MessageType>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Message::new(
            MessageId::from(value.id),
            from,
            to,
            text,
            message_type,
            value.sent_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

#[derive(Clone)]
pub struct PgParticipantStore {
    pool: PgPool,
}

impl PgParticipantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantStore for PgParticipantStore {
    async fn register(&self, participant: Participant) -> Result<Participant, RepositoryError> {
        // 主键冲突时不返回行，由数据库保证同名并发登记只有一个成功
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            INSERT INTO participants (name, last_seen_at)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING name, last_seen_at
            "#,
        )
        .bind(participant.name.as_str())
        .bind(participant.last_seen_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record
            .ok_or(RepositoryError::Conflict)
            .and_then(Participant::try_from)
    }

    async fn heartbeat(
        &self,
        name: &ParticipantName,
        now: Timestamp,
    ) -> Result<Participant, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            UPDATE participants
            SET last_seen_at = $2
            WHERE name = $1
            RETURNING name, last_seen_at
            "#,
        )
        .bind(name.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record
            .ok_or(RepositoryError::NotFound)
            .and_then(Participant::try_from)
    }

    async fn find(&self, name: &ParticipantName) -> Result<Option<Participant>, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"SELECT name, last_seen_at FROM participants WHERE name = $1"#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Participant::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Participant>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"SELECT name, last_seen_at FROM participants ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }

    async fn remove(&self, name: &ParticipantName) -> Result<bool, RepositoryError> {
        let result = sqlx::query(r#"DELETE FROM participants WHERE name = $1"#)
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn expired(
        &self,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let Some(cutoff) = expiry_cutoff(now, ttl) else {
            return Ok(Vec::new());
        };
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"SELECT name, last_seen_at FROM participants WHERE last_seen_at <= $1"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgMessageLog {
    pool: PgPool,
}

impl PgMessageLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// 与 `domain::is_visible` 相同的可见性规则
const VISIBLE_TO_VIEWER: &str = r#"
    (message_type <> 'private' OR ($1::TEXT IS NOT NULL AND (sender = $1 OR recipient = $1)))
"#;

#[async_trait]
impl MessageLog for PgMessageLog {
    async fn append(&self, message: Message) -> Result<u64, RepositoryError> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO messages (id, sender, recipient, body, message_type, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING seq
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(message.from.as_str())
        .bind(message.to.as_str())
        .bind(message.text.as_str())
        .bind(message.message_type.as_str())
        .bind(message.sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        u64::try_from(seq).map_err(|_| invalid_data(format!("negative sequence {seq}")))
    }

    async fn query(
        &self,
        viewer: Option<&str>,
        limit: Option<MessageLimit>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = match limit {
            Some(limit) => {
                let sql = format!(
                    "SELECT id, sender, recipient, body, message_type, sent_at FROM messages \
                     WHERE {VISIBLE_TO_VIEWER} ORDER BY seq DESC LIMIT $2"
                );
                let limit = i64::try_from(limit.get()).unwrap_or(i64::MAX);
                sqlx::query_as::<_, MessageRecord>(&sql)
                    .bind(viewer)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT id, sender, recipient, body, message_type, sent_at FROM messages \
                     WHERE {VISIBLE_TO_VIEWER} ORDER BY seq ASC"
                );
                sqlx::query_as::<_, MessageRecord>(&sql)
                    .bind(viewer)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM messages"#)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(count.max(0) as u64)
    }

    async fn apply_retention(
        &self,
        policy: RetentionPolicy,
        now: Timestamp,
    ) -> Result<u64, RepositoryError> {
        if policy.is_keep_all() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let mut pruned = 0;

        if let Some(cutoff) = policy.age_cutoff(now) {
            pruned += sqlx::query(r#"DELETE FROM messages WHERE sent_at < $1"#)
                .bind(cutoff)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?
                .rows_affected();
        }

        if let Some(max) = policy.max_messages {
            let keep = i64::try_from(max).unwrap_or(i64::MAX);
            pruned += sqlx::query(
                r#"
                DELETE FROM messages
                WHERE seq NOT IN (SELECT seq FROM messages ORDER BY seq DESC LIMIT $1)
                "#,
            )
            .bind(keep)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(pruned)
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
