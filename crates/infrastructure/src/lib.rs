//! 基础设施层实现。
//!
//! 提供 PostgreSQL 存储适配器与存储后端选择，实现应用层定义的存储接口。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{build_stores, InfrastructureError, Stores};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageLog, PgParticipantStore};
