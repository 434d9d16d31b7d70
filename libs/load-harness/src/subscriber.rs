use std::sync::Arc;
use std::time::Duration;

use broker_api::{
    ChannelHandler, ClientEvent, ConsumedAck, MessageEnvelope, Outbox, SubscribeRequest,
    TopicPattern, WireError, latency_between, send_timestamp,
};
use broker_client::{ChannelExit, EventChannel};
use tokio_util::sync::CancellationToken;

use crate::metrics::{Counter, MetricsAggregator};
use crate::plan::LoadPlan;

/// Одна доставка, как её увидел subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceptionEvent {
    pub subscriber: usize,
    pub message_id: String,
    pub topic: String,
    /// Unix-время приёма, секунды.
    pub received_at: f64,
    /// `None`, если в payload нет пригодной метки отправки.
    pub latency: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Subscribed,
    Draining,
}

/// Итог работы subscriber'а.
#[derive(Debug, Clone)]
pub struct SubscriberOutcome {
    pub id: usize,
    /// Пройденные состояния по порядку.
    pub trail: Vec<SubscriberState>,
    /// `None`, если соединение не было установлено.
    pub exit: Option<ChannelExit>,
    pub received: u64,
    pub malformed: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Consumer: обработчик событий канала
// ═══════════════════════════════════════════════════════════════

/// Обработчик канала одного subscriber'а: пишет доставки в агрегатор
/// и подтверждает каждое сообщение событием `consumed`.
pub(crate) struct Consumer {
    id: usize,
    name: String,
    pattern: TopicPattern,
    metrics: Arc<MetricsAggregator>,
    received: u64,
    malformed: u64,
}

impl Consumer {
    pub(crate) fn new(id: usize, pattern: TopicPattern, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            id,
            name: format!("subscriber-{id}"),
            pattern,
            metrics,
            received: 0,
            malformed: 0,
        }
    }
}

impl ChannelHandler for Consumer {
    fn on_open(&mut self, out: &mut Outbox) {
        out.push(ClientEvent::Subscribe(SubscribeRequest {
            consumer: self.name.clone(),
            topics: vec![self.pattern.clone()],
        }));
    }

    fn on_subscribed(&mut self, _data: &serde_json::Value) {
        self.metrics.increment(Counter::Subscribed);
        tracing::debug!(subscriber = %self.name, pattern = %self.pattern, "subscribed");
    }

    fn on_message(&mut self, msg: MessageEnvelope, received_at: f64, out: &mut Outbox) {
        let latency = send_timestamp(&msg.message).map(|sent| latency_between(sent, received_at));
        let event = ReceptionEvent {
            subscriber: self.id,
            message_id: msg.message_id,
            topic: msg.topic,
            received_at,
            latency,
        };
        self.metrics.record_reception(&event);
        self.received += 1;

        out.push(ClientEvent::Consumed(ConsumedAck {
            consumer: self.name.clone(),
            topic: event.topic,
            message_id: event.message_id,
            message: msg.message,
        }));
    }

    fn on_malformed(&mut self, error: &WireError) {
        // Сообщение пришло, но не разобралось: доставка есть, latency и ack нет.
        if error.event() == Some("message") {
            self.metrics.increment(Counter::Malformed);
            self.metrics.record_received(self.id);
            self.received += 1;
            self.malformed += 1;
        }
        tracing::warn!(subscriber = %self.name, error = %error, "malformed event");
    }
}

// ═══════════════════════════════════════════════════════════════
//  SubscriberWorker
// ═══════════════════════════════════════════════════════════════

/// Держит одно постоянное соединение в течение окна наблюдения.
///
/// Disconnected → Connecting → Subscribed → Draining → Disconnected.
/// Ошибка подключения или регистрации сразу возвращает в Disconnected
/// и учитывается как ошибка. Соединение закрывается на любом пути выхода.
pub struct SubscriberWorker {
    id: usize,
    pattern: TopicPattern,
    ws_url: String,
    connect_timeout: Duration,
    window: Duration,
    metrics: Arc<MetricsAggregator>,
}

impl SubscriberWorker {
    pub fn new(id: usize, plan: &LoadPlan, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            id,
            pattern: plan.pattern_for(id),
            ws_url: plan.ws_url.clone(),
            connect_timeout: plan.connect_timeout,
            window: plan.observation_window(),
            metrics,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> SubscriberOutcome {
        let mut trail = vec![SubscriberState::Disconnected, SubscriberState::Connecting];
        let consumer = Consumer::new(self.id, self.pattern.clone(), self.metrics.clone());

        let connected = tokio::select! {
            _ = cancel.cancelled() => None,
            res = EventChannel::connect(&self.ws_url, consumer, self.connect_timeout) => Some(res),
        };

        let mut channel = match connected {
            Some(Ok(channel)) => channel,
            Some(Err(e)) => {
                self.metrics.increment(Counter::Error);
                tracing::warn!(subscriber = self.id, url = %self.ws_url, error = %e, "connect failed");
                trail.push(SubscriberState::Disconnected);
                return self.outcome(trail, None, 0, 0);
            }
            None => {
                trail.push(SubscriberState::Disconnected);
                return self.outcome(trail, None, 0, 0);
            }
        };

        self.metrics.increment(Counter::Connected);
        trail.push(SubscriberState::Subscribed);
        tracing::debug!(subscriber = self.id, pattern = %self.pattern, "connected");

        let result = channel.run_until(self.window, &cancel).await;

        trail.push(SubscriberState::Draining);
        channel.close().await;
        trail.push(SubscriberState::Disconnected);

        let exit = match result {
            Ok(exit) => {
                // Окно ещё не истекло: брокер оборвал соединение.
                if exit == ChannelExit::ClosedByServer {
                    self.metrics.increment(Counter::Error);
                    tracing::warn!(subscriber = self.id, "connection closed by broker");
                }
                Some(exit)
            }
            Err(e) => {
                self.metrics.increment(Counter::Error);
                tracing::warn!(subscriber = self.id, error = %e, "connection lost");
                Some(ChannelExit::ClosedByServer)
            }
        };

        let consumer = channel.into_handler();
        self.outcome(trail, exit, consumer.received, consumer.malformed)
    }

    fn outcome(
        &self,
        trail: Vec<SubscriberState>,
        exit: Option<ChannelExit>,
        received: u64,
        malformed: u64,
    ) -> SubscriberOutcome {
        SubscriberOutcome {
            id: self.id,
            trail,
            exit,
            received,
            malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(message: serde_json::Value) -> MessageEnvelope {
        MessageEnvelope {
            topic: "orders".into(),
            message_id: "m1".into(),
            producer: "publisher-0".into(),
            message,
        }
    }

    #[test]
    fn open_sends_single_subscription() {
        let metrics = Arc::new(MetricsAggregator::new());
        let mut c = Consumer::new(4, TopicPattern::Wildcard, metrics);
        let mut out = Outbox::new();
        c.on_open(&mut out);

        let events: Vec<_> = out.drain().collect();
        assert_eq!(
            events,
            vec![ClientEvent::Subscribe(SubscribeRequest {
                consumer: "subscriber-4".into(),
                topics: vec![TopicPattern::Wildcard],
            })]
        );
    }

    #[test]
    fn timestamped_message_yields_latency_and_ack() {
        let metrics = Arc::new(MetricsAggregator::new());
        let mut c = Consumer::new(1, TopicPattern::Wildcard, metrics.clone());
        let mut out = Outbox::new();

        c.on_message(envelope(json!({"timestamp": 100.0})), 100.25, &mut out);

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 1);
        assert_eq!(snap.latency_samples, vec![Duration::from_millis(250)]);
        assert_eq!(snap.per_subscriber.get(&1), Some(&1));

        let events: Vec<_> = out.drain().collect();
        match &events[..] {
            [ClientEvent::Consumed(ack)] => {
                assert_eq!(ack.consumer, "subscriber-1");
                assert_eq!(ack.topic, "orders");
                assert_eq!(ack.message_id, "m1");
            }
            other => panic!("unexpected outbox: {other:?}"),
        }
    }

    #[test]
    fn missing_or_zero_timestamp_counts_without_latency() {
        let metrics = Arc::new(MetricsAggregator::new());
        let mut c = Consumer::new(0, TopicPattern::Wildcard, metrics.clone());
        let mut out = Outbox::new();

        c.on_message(envelope(json!({"timestamp": 0})), 50.0, &mut out);
        c.on_message(envelope(json!({"body": "no stamp"})), 50.0, &mut out);
        c.on_message(envelope(json!("plain string")), 50.0, &mut out);

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 3);
        assert!(snap.latency_samples.is_empty());
        assert_eq!(out.drain().count(), 3);
    }

    #[test]
    fn clock_skew_clamps_to_zero() {
        let metrics = Arc::new(MetricsAggregator::new());
        let mut c = Consumer::new(0, TopicPattern::Wildcard, metrics.clone());
        let mut out = Outbox::new();

        c.on_message(envelope(json!({"timestamp": 200.0})), 199.0, &mut out);
        assert_eq!(metrics.snapshot().latency_samples, vec![Duration::ZERO]);
    }

    #[test]
    fn malformed_message_counts_as_received_without_ack() {
        let metrics = Arc::new(MetricsAggregator::new());
        let mut c = Consumer::new(2, TopicPattern::Wildcard, metrics.clone());

        let bad_message = broker_api::ServerEvent::decode(r#"{"event":"message","data":42}"#)
            .expect_err("payload must not decode");
        c.on_malformed(&bad_message);

        let bad_frame = broker_api::ServerEvent::decode("{garbage").expect_err("frame");
        c.on_malformed(&bad_frame);

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 1);
        assert_eq!(snap.malformed, 1);
        assert!(snap.latency_samples.is_empty());
    }

    #[tokio::test]
    async fn unreachable_broker_is_one_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut plan = LoadPlan::for_profile(crate::plan::Profile::Perf);
        plan.ws_url = format!("ws://{addr}/ws");
        plan.connect_timeout = Duration::from_secs(1);

        let metrics = Arc::new(MetricsAggregator::new());
        let out = SubscriberWorker::new(0, &plan, metrics.clone())
            .run(CancellationToken::new())
            .await;

        assert_eq!(out.exit, None);
        assert_eq!(
            out.trail,
            vec![
                SubscriberState::Disconnected,
                SubscriberState::Connecting,
                SubscriberState::Disconnected
            ]
        );
        let snap = metrics.snapshot();
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.connected, 0);
    }
}
