use std::sync::Arc;

use application::{MemoryMessageLog, MemoryParticipantStore, MessageLog, ParticipantStore};
use config::{StorageBackend, StorageConfig};
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgMessageLog, PgParticipantStore},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
}

/// 参与者登记表与消息日志，总是来自同一个后端
#[derive(Clone)]
pub struct Stores {
    pub participant_store: Arc<dyn ParticipantStore>,
    pub message_log: Arc<dyn MessageLog>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            participant_store: Arc::new(MemoryParticipantStore::new()),
            message_log: Arc::new(MemoryMessageLog::new()),
        }
    }
}

/// 按配置选择存储后端；PostgreSQL 后端会先执行迁移
pub async fn build_stores(config: &StorageConfig) -> Result<Stores, InfrastructureError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("使用内存存储后端");
            Ok(Stores::in_memory())
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(InfrastructureError::MissingConfig("storage.database_url"))?;

            let pool = create_pg_pool(url, config.max_connections).await?;
            MIGRATOR.run(&pool).await?;
            tracing::info!(
                max_connections = config.max_connections,
                "PostgreSQL 存储后端已连接"
            );

            Ok(Stores {
                participant_store: Arc::new(PgParticipantStore::new(pool.clone())),
                message_log: Arc::new(PgMessageLog::new(pool)),
            })
        }
    }
}
