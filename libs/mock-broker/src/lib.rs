//! Брокер в процессе для тестов: тот же HTTP/WebSocket контракт, что и
//! у настоящего, без хранения на диске и без Socket.IO.

mod http;
mod state;
mod ws;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use state::{BrokerState, ClientInfo};

pub fn router(state: BrokerState) -> Router {
    Router::new()
        .route("/publish", post(http::handle_publish))
        .route("/health", get(http::handle_health))
        .route("/clients", get(http::handle_clients))
        .route("/messages", get(http::handle_messages))
        .route("/consumptions", get(http::handle_consumptions))
        .route("/graph/state", get(http::handle_graph))
        .route("/ws", get(ws::handle_ws))
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════
//  MockBroker
// ═══════════════════════════════════════════════════════════════

/// Запущенный брокер на `127.0.0.1:<свободный порт>`.
pub struct MockBroker {
    addr: SocketAddr,
    state: BrokerState,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl MockBroker {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(BrokerState::new()).await
    }

    pub async fn start_with(state: BrokerState) -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let app = router(state.clone());
        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "mock broker serve");
            }
        });

        tracing::debug!(%addr, "mock broker started");
        Ok(Self {
            addr,
            state,
            shutdown,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    /// Остановить приём соединений. Открытые WebSocket'ы обрываются.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.abort();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use broker_api::PublishRequest;
    use broker_client::PublishClient;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn publish_validates_fields() {
        let broker = MockBroker::start().await.unwrap();
        let client = PublishClient::new(&broker.http_url(), Duration::from_secs(2)).unwrap();

        let ok = PublishRequest {
            topic: "orders".into(),
            message_id: "m1".into(),
            producer: "p".into(),
            message: json!({"n": 1}),
        };
        client.publish(&ok).await.unwrap();

        let empty_topic = PublishRequest {
            topic: String::new(),
            ..ok.clone()
        };
        let err = client.publish(&empty_topic).await.unwrap_err();
        assert!(matches!(err, broker_client::ClientError::Status(400)));

        broker.state().set_reject_publish(true);
        let err = client.publish(&ok).await.unwrap_err();
        assert!(matches!(err, broker_client::ClientError::Status(503)));

        assert_eq!(broker.state().messages().await.len(), 1);
        broker.stop().await;
    }
}
