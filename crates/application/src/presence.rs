//! 在线状态清理
//!
//! `PresenceReaper` 按固定间隔扫描参与者登记表，清理超过存活时间未发送心跳的参与者，
//! 并向消息日志写入离开通知。每个参与者的清理互相独立：一个失败不会影响其它参与者。

use std::sync::Arc;
use std::time::Duration;

use domain::{DomainError, Message, MessageId, ParticipantName, RetentionPolicy, Timestamp};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{MessageLog, ParticipantStore},
};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_PARTICIPANT_TTL: Duration = Duration::from_secs(10);

/// 清理任务参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSettings {
    sweep_interval: Duration,
    participant_ttl: Duration,
    retention: RetentionPolicy,
}

impl ReaperSettings {
    /// 存活时间必须严格小于扫描间隔，保证参与者在变为过期后的一次扫描内被清理。
    pub fn new(sweep_interval: Duration, participant_ttl: Duration) -> Result<Self, DomainError> {
        if participant_ttl.is_zero() {
            return Err(DomainError::invalid_argument(
                "participant_ttl",
                "must be positive",
            ));
        }
        if participant_ttl >= sweep_interval {
            return Err(DomainError::invalid_argument(
                "participant_ttl",
                "must be shorter than the sweep interval",
            ));
        }
        Ok(Self {
            sweep_interval,
            participant_ttl,
            retention: RetentionPolicy::keep_all(),
        })
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn participant_ttl(&self) -> Duration {
        self.participant_ttl
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            participant_ttl: DEFAULT_PARTICIPANT_TTL,
            retention: RetentionPolicy::keep_all(),
        }
    }
}

/// 单次扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 快照中过期的参与者数量
    pub expired: usize,
    /// 本次真正移除并通知的参与者
    pub evicted: Vec<ParticipantName>,
    pub failures: usize,
    pub pruned_messages: u64,
}

pub struct PresenceReaper {
    participant_store: Arc<dyn ParticipantStore>,
    message_log: Arc<dyn MessageLog>,
    clock: Arc<dyn Clock>,
    settings: ReaperSettings,
}

impl PresenceReaper {
    pub fn new(
        participant_store: Arc<dyn ParticipantStore>,
        message_log: Arc<dyn MessageLog>,
        clock: Arc<dyn Clock>,
        settings: ReaperSettings,
    ) -> Self {
        Self {
            participant_store,
            message_log,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> ReaperSettings {
        self.settings
    }

    /// 执行一次扫描。
    ///
    /// 只有读取过期快照失败时才返回错误；单个参与者的失败记录日志并计入报告。
    pub async fn sweep(&self) -> Result<SweepReport, ApplicationError> {
        let now = self.clock.now();
        let stale = self
            .participant_store
            .expired(now, self.settings.participant_ttl)
            .await?;

        let mut report = SweepReport {
            expired: stale.len(),
            ..SweepReport::default()
        };

        let outcomes = futures::future::join_all(
            stale.into_iter().map(|participant| async move {
                let outcome = self.evict(&participant.name, now).await;
                (participant.name, outcome)
            }),
        )
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(true) => report.evicted.push(name),
                // 已被并发移除，不重复通知
                Ok(false) => {}
                Err(err) => {
                    report.failures += 1;
                    tracing::warn!(participant = %name, error = %err, "清理过期参与者失败");
                }
            }
        }

        let retention = self.settings.retention;
        if !retention.is_keep_all() {
            match self.message_log.apply_retention(retention, now).await {
                Ok(pruned) => report.pruned_messages = pruned,
                Err(err) => {
                    report.failures += 1;
                    tracing::warn!(error = %err, "消息日志清理失败");
                }
            }
        }

        Ok(report)
    }

    async fn evict(
        &self,
        name: &ParticipantName,
        now: Timestamp,
    ) -> Result<bool, ApplicationError> {
        if !self.participant_store.remove(name).await? {
            return Ok(false);
        }
        self.message_log
            .append(Message::left(MessageId::generate(), name.clone(), now))
            .await?;
        tracing::info!(participant = %name, "参与者超时，已移出聊天室");
        Ok(true)
    }

    /// 启动后台扫描任务。
    ///
    /// 返回的句柄负责停止任务；停止时正在进行的扫描会执行完毕。
    pub fn spawn(self: Arc<Self>) -> ReaperHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        ReaperHandle { shutdown, task }
    }

    async fn run(&self, shutdown: CancellationToken) {
        let period = self.settings.sweep_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            sweep_interval_secs = period.as_secs_f64(),
            participant_ttl_secs = self.settings.participant_ttl.as_secs_f64(),
            "在线状态清理任务启动"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.sweep().await {
                Ok(report) => tracing::debug!(
                    expired = report.expired,
                    evicted = report.evicted.len(),
                    failures = report.failures,
                    pruned = report.pruned_messages,
                    "在线状态扫描完成"
                ),
                Err(err) => tracing::error!(error = %err, "在线状态扫描失败"),
            }
        }

        tracing::info!("在线状态清理任务已停止");
    }
}

/// 后台清理任务的句柄，随进程生命周期持有
pub struct ReaperHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// 停止触发新的扫描并等待当前扫描完成
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "在线状态清理任务异常退出");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
