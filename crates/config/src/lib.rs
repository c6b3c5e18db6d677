//! 统一配置中心
//!
//! 按 默认值 -> 配置文件（`CHAT_CONFIG_FILE`）-> 环境变量（`CHAT_*`）的顺序合并配置，包括：
//! - 服务监听地址与 CORS
//! - 存储后端
//! - 在线状态清理参数
//! - 消息保留策略

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// 配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG_FILE";
/// 环境变量前缀，层级之间用 `__` 分隔
pub const ENV_PREFIX: &str = "CHAT_";

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `*` 表示允许任意来源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            cors_origins: vec!["*".into()],
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

/// 在线状态清理配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceConfig {
    pub sweep_interval_secs: u64,
    pub participant_ttl_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 15,
            participant_ttl_secs: 10,
        }
    }
}

impl PresenceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn participant_ttl(&self) -> Duration {
        Duration::from_secs(self.participant_ttl_secs)
    }
}

/// 消息保留配置，都为空时保留全部消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetentionConfig {
    #[serde(default)]
    pub max_messages: Option<usize>,
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl RetentionConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment().extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 合并后的配置来源，测试中可以直接提取
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerPort(
                "port must be greater than 0".to_string(),
            ));
        }

        let presence = &self.presence;
        if presence.participant_ttl_secs == 0 {
            return Err(ConfigError::InvalidPresenceConfig(
                "participant_ttl_secs must be greater than 0".to_string(),
            ));
        }
        // 过期时间必须小于扫描间隔
        if presence.participant_ttl_secs >= presence.sweep_interval_secs {
            return Err(ConfigError::InvalidPresenceConfig(format!(
                "participant_ttl_secs ({}) must be less than sweep_interval_secs ({})",
                presence.participant_ttl_secs, presence.sweep_interval_secs
            )));
        }

        if self.storage.backend == StorageBackend::Postgres {
            match self.storage.database_url.as_deref() {
                Some(url) if !url.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::InvalidDatabaseUrl(
                        "postgres backend requires storage.database_url".to_string(),
                    ))
                }
            }
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if self.retention.max_messages == Some(0) {
            return Err(ConfigError::InvalidRetentionConfig(
                "max_messages must be greater than 0".to_string(),
            ));
        }
        if self.retention.max_age_secs == Some(0) {
            return Err(ConfigError::InvalidRetentionConfig(
                "max_age_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port: {0}")]
    InvalidServerPort(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid presence configuration: {0}")]
    InvalidPresenceConfig(String),
    #[error("Invalid retention configuration: {0}")]
    InvalidRetentionConfig(String),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}
