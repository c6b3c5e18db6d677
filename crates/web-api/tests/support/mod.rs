#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, Clock, MemoryMessageLog, MemoryParticipantStore,
    SystemClock,
};
use axum::Router;
use tokio::{net::TcpListener, sync::oneshot};
use web_api::{router, AppState};

pub struct TestServer {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn build_router() -> Router {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let chat_service = ChatService::new(ChatServiceDependencies {
        participant_store: Arc::new(MemoryParticipantStore::new()),
        message_log: Arc::new(MemoryMessageLog::new()),
        clock,
    });

    router(AppState::new(Arc::new(chat_service)), &["*".to_string()])
}

pub async fn spawn_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = build_router();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        shutdown: Some(shutdown_tx),
    }
}
