use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::subscriber::ReceptionEvent;

/// Скалярные счётчики прогона.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Sent,
    Error,
    Connected,
    Received,
    /// Подтверждения подписки от брокера.
    Subscribed,
    /// Сообщения, чей payload не разобрался.
    Malformed,
}

#[derive(Debug, Default)]
struct AggregateState {
    sent: u64,
    received: u64,
    errors: u64,
    connected: u64,
    subscribed: u64,
    malformed: u64,
    latency_samples: Vec<Duration>,
    publish_latency_samples: Vec<Duration>,
    per_subscriber: BTreeMap<usize, u64>,
}

/// Согласованный снимок всех метрик на один момент.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot {
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
    pub connected: u64,
    pub subscribed: u64,
    pub malformed: u64,
    pub latency_samples: Vec<Duration>,
    pub publish_latency_samples: Vec<Duration>,
    pub per_subscriber: BTreeMap<usize, u64>,
}

// ═══════════════════════════════════════════════════════════════
//  MetricsAggregator
// ═══════════════════════════════════════════════════════════════

/// Общий для всех воркеров агрегатор. Каждая операция занимает одну короткую
/// критическую секцию; блокировка никогда не держится через `.await`.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: Mutex<AggregateState>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        let mut s = self.lock();
        let slot = match counter {
            Counter::Sent => &mut s.sent,
            Counter::Error => &mut s.errors,
            Counter::Connected => &mut s.connected,
            Counter::Received => &mut s.received,
            Counter::Subscribed => &mut s.subscribed,
            Counter::Malformed => &mut s.malformed,
        };
        *slot += n;
    }

    /// Сквозная latency доставки.
    pub fn record_latency(&self, latency: Duration) {
        self.lock().latency_samples.push(latency);
    }

    /// Время ответа publish-вызова.
    pub fn record_publish_latency(&self, latency: Duration) {
        self.lock().publish_latency_samples.push(latency);
    }

    /// `received` и счётчик subscriber'а растут вместе.
    pub fn record_received(&self, subscriber: usize) {
        let mut s = self.lock();
        s.received += 1;
        *s.per_subscriber.entry(subscriber).or_default() += 1;
    }

    /// Доставка целиком: счётчики и latency (если есть) под одной блокировкой.
    pub fn record_reception(&self, event: &ReceptionEvent) {
        let mut s = self.lock();
        s.received += 1;
        *s.per_subscriber.entry(event.subscriber).or_default() += 1;
        if let Some(latency) = event.latency {
            s.latency_samples.push(latency);
        }
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        let s = self.lock();
        AggregateSnapshot {
            sent: s.sent,
            received: s.received,
            errors: s.errors,
            connected: s.connected,
            subscribed: s.subscribed,
            malformed: s.malformed,
            latency_samples: s.latency_samples.clone(),
            publish_latency_samples: s.publish_latency_samples.clone(),
            per_subscriber: s.per_subscriber.clone(),
        }
    }

    /// Только счётчики, без копирования выборок. Для монитора.
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        let s = self.lock();
        (s.sent, s.received, s.errors, s.connected)
    }

    fn lock(&self) -> MutexGuard<'_, AggregateState> {
        // Паника другого воркера не должна терять обновления.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
