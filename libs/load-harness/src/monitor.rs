use std::sync::Arc;
use std::time::Duration;

use broker_api::unix_now_secs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsAggregator;

/// Одна строка прогресса: счётчики и скорости с прошлого тика.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorTick {
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
    pub connected: u64,
    pub expected_subscribers: usize,
    pub sent_rate: f64,
    pub received_rate: f64,
}

impl MonitorTick {
    /// `prev`: `(sent, received)` прошлого тика; `now`: `(sent, received, errors, connected)`.
    pub fn compute(
        prev: (u64, u64),
        now: (u64, u64, u64, u64),
        interval: Duration,
        expected_subscribers: usize,
    ) -> Self {
        let (sent, received, errors, connected) = now;
        let secs = interval.as_secs_f64();
        let rate = |cur: u64, before: u64| {
            if secs > 0.0 {
                cur.saturating_sub(before) as f64 / secs
            } else {
                0.0
            }
        };
        Self {
            sent,
            received,
            errors,
            connected,
            expected_subscribers,
            sent_rate: rate(sent, prev.0),
            received_rate: rate(received, prev.1),
        }
    }

    pub fn line(&self, clock: &str) -> String {
        format!(
            "[{clock}] Sent: {} (+{:.1}/s) | Received: {} (+{:.1}/s) | Errors: {} | Subscribers: {}/{}",
            self.sent,
            self.sent_rate,
            self.received,
            self.received_rate,
            self.errors,
            self.connected,
            self.expected_subscribers,
        )
    }
}

/// `HH:MM:SS` по UTC.
fn wall_clock(unix_secs: f64) -> String {
    let day = (unix_secs.max(0.0) as u64) % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
}

/// Фоновый монитор: раз в `interval` печатает строку прогресса.
///
/// Только читает агрегатор. Останавливается отменой `cancel`; владелец не
/// ждёт его завершения дольше одного тика.
pub fn spawn_monitor(
    metrics: Arc<MetricsAggregator>,
    interval: Duration,
    expected_subscribers: usize,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        let mut prev = (0, 0);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = metrics.counters();
                    let tick = MonitorTick::compute(prev, now, interval, expected_subscribers);
                    println!("{}", tick.line(&wall_clock(unix_now_secs())));
                    prev = (now.0, now.1);
                }
            }
        }
    })
}
