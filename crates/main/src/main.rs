//! 主应用程序入口
//!
//! 加载配置，选择存储后端，启动在线状态清理任务与 Axum Web API 服务。

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, Clock, PresenceReaper, ReaperSettings, SystemClock,
};
use config::{AppConfig, RetentionConfig};
use domain::RetentionPolicy;
use infrastructure::build_stores;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        backend = ?config.storage.backend,
        sweep_interval_secs = config.presence.sweep_interval_secs,
        participant_ttl_secs = config.presence.participant_ttl_secs,
        "配置加载完成"
    );

    let stores = build_stores(&config.storage).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let chat_service = ChatService::new(ChatServiceDependencies {
        participant_store: stores.participant_store.clone(),
        message_log: stores.message_log.clone(),
        clock: clock.clone(),
    });

    let settings = ReaperSettings::new(
        config.presence.sweep_interval(),
        config.presence.participant_ttl(),
    )?
    .with_retention(retention_policy(&config.retention));
    let reaper = Arc::new(PresenceReaper::new(
        stores.participant_store,
        stores.message_log,
        clock,
        settings,
    ))
    .spawn();

    let app = router(
        AppState::new(Arc::new(chat_service)),
        &config.server.cors_origins,
    );
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("聊天服务启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 等待正在进行的扫描结束
    reaper.shutdown().await;
    tracing::info!("聊天服务已停止");

    Ok(())
}

fn retention_policy(config: &RetentionConfig) -> RetentionPolicy {
    RetentionPolicy {
        max_messages: config.max_messages,
        max_age: config.max_age(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "无法监听 Ctrl+C 信号");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig_term) => {
                sig_term.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "无法监听终止信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("接收到 Ctrl+C 信号，开始优雅停机..."),
        _ = terminate => tracing::info!("接收到终止信号，开始优雅停机..."),
    }
}
