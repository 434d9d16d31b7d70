use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use broker_api::{ConsumedAck, MessageEnvelope, ServerEvent, TopicPattern};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

// ═══════════════════════════════════════════════════════════════
//  Client
// ═══════════════════════════════════════════════════════════════

struct Client {
    id: u64,
    consumer: String,
    patterns: Vec<TopicPattern>,
    tx: mpsc::Sender<String>,
}

/// Публичное описание подключённого клиента (`GET /clients`).
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: u64,
    pub consumer: String,
    pub topics: Vec<TopicPattern>,
}

#[derive(Default)]
struct Inner {
    clients: RwLock<Vec<Client>>,
    messages: RwLock<Vec<MessageEnvelope>>,
    consumptions: RwLock<Vec<ConsumedAck>>,
    next_id: AtomicU64,
    reject_publish: AtomicBool,
}

// ═══════════════════════════════════════════════════════════════
//  BrokerState
// ═══════════════════════════════════════════════════════════════

/// Состояние брокера: журнал сообщений и подтверждений, подписчики.
///
/// Каждый подписчик получает фреймы через свой mpsc; переполненный
/// буфер означает потерю фрейма для этого подписчика, а закрытый канал
/// удаляет подписчика.
#[derive(Clone, Default)]
pub struct BrokerState {
    inner: Arc<Inner>,
}

impl BrokerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject_publish(&self, reject: bool) {
        self.inner.reject_publish.store(reject, Ordering::Relaxed);
    }

    pub fn rejects_publish(&self) -> bool {
        self.inner.reject_publish.load(Ordering::Relaxed)
    }

    /// Зарегистрировать подписчика. Возвращает его id.
    pub async fn register(
        &self,
        consumer: String,
        patterns: Vec<TopicPattern>,
        tx: mpsc::Sender<String>,
    ) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.clients.write().await.push(Client {
            id,
            consumer,
            patterns,
            tx,
        });
        id
    }

    pub async fn unregister(&self, id: u64) {
        self.inner.clients.write().await.retain(|c| c.id != id);
    }

    /// Записать сообщение и разослать подходящим подписчикам.
    /// Возвращает число подписчиков, которым фрейм поставлен в очередь.
    pub async fn publish(&self, msg: MessageEnvelope) -> usize {
        let frame = match ServerEvent::Message(msg.clone()).encode() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "encode message frame");
                return 0;
            }
        };
        let topic = msg.topic.clone();
        self.inner.messages.write().await.push(msg);

        let mut delivered = 0;
        let mut clients = self.inner.clients.write().await;
        let mut i = 0;
        while i < clients.len() {
            let client = &clients[i];
            if !client.patterns.iter().any(|p| p.matches(&topic)) {
                i += 1;
                continue;
            }
            match client.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(consumer = %client.consumer, %topic, "client buffer full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    clients.swap_remove(i);
                    continue;
                }
            }
            i += 1;
        }
        delivered
    }

    pub async fn record_consumption(&self, ack: ConsumedAck) {
        self.inner.consumptions.write().await.push(ack);
    }

    pub async fn clients(&self) -> Vec<ClientInfo> {
        self.inner
            .clients
            .read()
            .await
            .iter()
            .map(|c| ClientInfo {
                id: c.id,
                consumer: c.consumer.clone(),
                topics: c.patterns.clone(),
            })
            .collect()
    }

    pub async fn messages(&self) -> Vec<MessageEnvelope> {
        self.inner.messages.read().await.clone()
    }

    pub async fn consumptions(&self) -> Vec<ConsumedAck> {
        self.inner.consumptions.read().await.clone()
    }
}
