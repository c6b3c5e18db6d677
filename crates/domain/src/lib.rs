//! 聊天中继核心领域模型
//!
//! 包含参与者、消息、可见性规则与日志保留策略等核心概念。

pub mod errors;
pub mod message;
pub mod participant;
pub mod retention;
pub mod value_objects;
pub mod visibility;

// 重新导出常用类型
pub use errors::*;
pub use message::{Message, MessageType, Recipient, JOINED_TEXT, LEFT_TEXT};
pub use participant::{expiry_cutoff, Participant};
pub use retention::RetentionPolicy;
pub use value_objects::*;
pub use visibility::is_visible;
