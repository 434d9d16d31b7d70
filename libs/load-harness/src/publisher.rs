use std::sync::Arc;
use std::time::Instant;

use broker_api::{MessageBody, PublishRequest, unix_now_secs};
use broker_client::PublishClient;
use tokio_util::sync::CancellationToken;

use crate::error::HarnessError;
use crate::metrics::{Counter, MetricsAggregator};
use crate::plan::{LoadPlan, RunMode};

/// Одно сообщение, которое publisher собирается отправить.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRecord {
    pub topic: String,
    pub message_id: String,
    pub producer: String,
    pub body: MessageBody,
}

impl PublishRecord {
    /// Метка отправки берётся в момент построения, непосредственно перед вызовом.
    pub fn new(publisher: usize, seq: u64, topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            message_id: format!("msg-{publisher}-{seq}"),
            producer: format!("publisher-{publisher}"),
            body: MessageBody {
                index: seq,
                publisher: publisher as u32,
                timestamp: unix_now_secs(),
            },
        }
    }

    pub fn to_request(&self) -> PublishRequest {
        PublishRequest {
            topic: self.topic.clone(),
            message_id: self.message_id.clone(),
            producer: self.producer.clone(),
            message: serde_json::json!({
                "index": self.body.index,
                "publisher": self.body.publisher,
                "timestamp": self.body.timestamp,
            }),
        }
    }
}

/// Итог одного publisher'а. `sent + errors == attempts` всегда.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherOutcome {
    pub id: usize,
    pub attempts: u64,
    pub sent: u64,
    pub errors: u64,
}

// ═══════════════════════════════════════════════════════════════
//  PublisherWorker
// ═══════════════════════════════════════════════════════════════

/// Шлёт сообщения последовательно: вызов, учёт результата, пауза.
///
/// Ошибки вызова не прерывают цикл. Начатый вызов всегда доводится до
/// результата (его ограничивает таймаут клиента), поэтому отмена не
/// оставляет попыток без учёта.
pub struct PublisherWorker {
    id: usize,
    client: PublishClient,
    plan: LoadPlan,
    metrics: Arc<MetricsAggregator>,
}

impl PublisherWorker {
    pub fn new(
        id: usize,
        plan: &LoadPlan,
        metrics: Arc<MetricsAggregator>,
    ) -> Result<Self, HarnessError> {
        Ok(Self {
            id,
            client: PublishClient::new(&plan.broker_url, plan.publish_timeout)?,
            plan: plan.clone(),
            metrics,
        })
    }

    pub async fn run(self, cancel: CancellationToken) -> PublisherOutcome {
        let mut out = PublisherOutcome {
            id: self.id,
            ..Default::default()
        };
        let start = Instant::now();

        loop {
            let more = match self.plan.mode {
                RunMode::Count(n) => out.attempts < n,
                RunMode::Duration(d) => start.elapsed() < d,
            };
            if !more || cancel.is_cancelled() {
                break;
            }

            let topic = self.plan.topic_for(out.attempts);
            let record = PublishRecord::new(self.id, out.attempts, topic);
            out.attempts += 1;

            let call = Instant::now();
            match self.client.publish(&record.to_request()).await {
                Ok(()) => {
                    out.sent += 1;
                    self.metrics.increment(Counter::Sent);
                    self.metrics.record_publish_latency(call.elapsed());
                }
                Err(e) => {
                    out.errors += 1;
                    self.metrics.increment(Counter::Error);
                    tracing::warn!(
                        publisher = self.id,
                        message_id = %record.message_id,
                        error = %e,
                        "publish failed"
                    );
                }
            }

            if !self.plan.interval.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.plan.interval) => {}
                }
            }
        }

        tracing::debug!(
            publisher = self.id,
            attempts = out.attempts,
            sent = out.sent,
            errors = out.errors,
            "publisher finished"
        );
        out
    }
}
