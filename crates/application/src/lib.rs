//! 应用层实现。
//!
//! 提供聊天中继的用例服务、在线状态清理任务，以及存储端口和内存实现。

pub mod clock;
pub mod dto;
pub mod error;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{MessageDto, ParticipantDto};
pub use error::{ApplicationError, ApplicationResult};
pub use memory::{MemoryMessageLog, MemoryParticipantStore};
pub use presence::{
    PresenceReaper, ReaperHandle, ReaperSettings, SweepReport, DEFAULT_PARTICIPANT_TTL,
    DEFAULT_SWEEP_INTERVAL,
};
pub use repository::{MessageLog, ParticipantStore};
pub use services::{ChatService, ChatServiceDependencies, ListMessagesRequest, SendMessageRequest};
