use std::fmt::Write as _;
use std::time::Duration;

use broker_client::EndpointProbe;
use serde::Serialize;

use crate::metrics::AggregateSnapshot;
use crate::plan::{LoadPlan, RunMode};

/// Элемент отсортированной выборки по доле `fraction` ∈ [0, 1].
///
/// Индекс `floor(fraction × n)`, зажатый в `[0, n-1]`: ближайший снизу,
/// без интерполяции.
pub fn percentile<T: Copy>(sorted: &[T], fraction: f64) -> Option<T> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (fraction.clamp(0.0, 1.0) * sorted.len() as f64).floor() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Доля успешных publish-вызовов, 0.0 при отсутствии попыток.
pub fn success_rate(sent: u64, errors: u64) -> f64 {
    let total = sent + errors;
    if total == 0 {
        0.0
    } else {
        sent as f64 / total as f64
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// ═══════════════════════════════════════════════════════════════
//  LatencyStats
// ═══════════════════════════════════════════════════════════════

/// Описательная статистика выборки latency, в миллисекундах.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    /// Выборочное отклонение; только при двух и более замерах.
    pub stdev_ms: Option<f64>,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// `None` для пустой выборки.
    pub fn compute(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().map(ms).collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let stdev = (n >= 2).then(|| {
            let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        });

        Some(Self {
            samples: n,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            mean_ms: mean,
            median_ms: median,
            stdev_ms: stdev,
            p50_ms: percentile(&sorted, 0.50)?,
            p95_ms: percentile(&sorted, 0.95)?,
            p99_ms: percentile(&sorted, 0.99)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriberCount {
    pub subscriber: usize,
    pub received: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Report
// ═══════════════════════════════════════════════════════════════

/// Итог прогона. Строится один раз, после остановки всех воркеров и drain.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub interrupted: bool,
    pub broker_url: String,
    pub publishers: usize,
    pub subscribers: usize,
    pub topics: Vec<String>,
    /// Длительность фазы публикации, секунды.
    pub elapsed_secs: f64,
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
    pub connected: u64,
    pub subscribed: u64,
    pub malformed: u64,
    pub send_throughput: f64,
    pub receive_throughput: f64,
    pub success_rate: f64,
    /// Сквозная latency доставки.
    pub latency: Option<LatencyStats>,
    /// Время ответа publish-вызова.
    pub publish_latency: Option<LatencyStats>,
    pub per_subscriber: Vec<SubscriberCount>,
    pub inspection: Vec<EndpointProbe>,
}

impl Report {
    pub fn build(
        plan: &LoadPlan,
        snap: &AggregateSnapshot,
        elapsed: Duration,
        inspection: Vec<EndpointProbe>,
        interrupted: bool,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };

        let per_subscriber = (0..plan.subscribers)
            .map(|subscriber| SubscriberCount {
                subscriber,
                received: snap.per_subscriber.get(&subscriber).copied().unwrap_or(0),
            })
            .collect();

        Self {
            interrupted,
            broker_url: plan.broker_url.clone(),
            publishers: plan.publishers,
            subscribers: plan.subscribers,
            topics: plan.topics.clone(),
            elapsed_secs: secs,
            sent: snap.sent,
            received: snap.received,
            errors: snap.errors,
            connected: snap.connected,
            subscribed: snap.subscribed,
            malformed: snap.malformed,
            send_throughput: rate(snap.sent),
            receive_throughput: rate(snap.received),
            success_rate: success_rate(snap.sent, snap.errors),
            latency: LatencyStats::compute(&snap.latency_samples),
            publish_latency: LatencyStats::compute(&snap.publish_latency_samples),
            per_subscriber,
            inspection,
        }
    }

    /// Человекочитаемый отчёт.
    pub fn render(&self) -> String {
        let mut s = String::new();
        let rule = "=".repeat(60);

        let _ = writeln!(s, "\n{rule}");
        if self.interrupted {
            let _ = writeln!(s, "LOAD TEST RESULTS (interrupted)");
        } else {
            let _ = writeln!(s, "LOAD TEST RESULTS");
        }
        let _ = writeln!(s, "{rule}");
        let _ = writeln!(s, "Broker: {}", self.broker_url);
        let _ = writeln!(
            s,
            "Publishers: {} | Subscribers: {} (connected {}, subscribed {})",
            self.publishers, self.subscribers, self.connected, self.subscribed
        );
        let _ = writeln!(s, "Duration: {:.2}s", self.elapsed_secs);

        let _ = writeln!(s, "\nMessages:");
        let _ = writeln!(s, "  Sent:      {}", self.sent);
        let _ = writeln!(s, "  Received:  {}", self.received);
        let _ = writeln!(s, "  Errors:    {}", self.errors);
        if self.malformed > 0 {
            let _ = writeln!(s, "  Malformed: {}", self.malformed);
        }
        let _ = writeln!(s, "  Success rate: {:.2}%", self.success_rate * 100.0);

        let _ = writeln!(s, "\nThroughput:");
        let _ = writeln!(s, "  Send:    {:.2} msg/s", self.send_throughput);
        let _ = writeln!(s, "  Receive: {:.2} msg/s", self.receive_throughput);

        render_latency(&mut s, "Delivery latency", self.latency.as_ref());
        render_latency(&mut s, "Publish call latency", self.publish_latency.as_ref());

        if !self.per_subscriber.is_empty() {
            let _ = writeln!(s, "\nPer-subscriber received:");
            for c in &self.per_subscriber {
                let _ = writeln!(s, "  subscriber-{}: {}", c.subscriber, c.received);
            }
        }

        if !self.inspection.is_empty() {
            let _ = writeln!(s, "\nInspection endpoints:");
            for p in &self.inspection {
                match p.mean_ms {
                    Some(mean) => {
                        let _ = writeln!(
                            s,
                            "  {:<18} {:>8.2}ms (ok {}, failed {})",
                            p.label, mean, p.ok, p.failed
                        );
                    }
                    None => {
                        let _ = writeln!(s, "  {:<18}      n/a (failed {})", p.label, p.failed);
                    }
                }
            }
        }

        let _ = writeln!(s, "{rule}");
        s
    }
}

/// Без выборок блок не печатается вовсе.
fn render_latency(s: &mut String, title: &str, stats: Option<&LatencyStats>) {
    let Some(l) = stats else {
        return;
    };
    let _ = writeln!(s, "\n{title}:");
    let _ = writeln!(s, "  Samples: {}", l.samples);
    let _ = writeln!(s, "  Min:     {:.2}ms", l.min_ms);
    let _ = writeln!(s, "  Max:     {:.2}ms", l.max_ms);
    let _ = writeln!(s, "  Mean:    {:.2}ms", l.mean_ms);
    let _ = writeln!(s, "  Median:  {:.2}ms", l.median_ms);
    if let Some(sd) = l.stdev_ms {
        let _ = writeln!(s, "  Stdev:   {sd:.2}ms");
    }
    let _ = writeln!(s, "  P50:     {:.2}ms", l.p50_ms);
    let _ = writeln!(s, "  P95:     {:.2}ms", l.p95_ms);
    let _ = writeln!(s, "  P99:     {:.2}ms", l.p99_ms);
}

/// Описание режима для баннера запуска.
pub fn describe_mode(plan: &LoadPlan) -> String {
    match plan.mode {
        RunMode::Count(n) => format!("{n} messages per publisher"),
        RunMode::Duration(d) => format!("{}s of publishing", d.as_secs_f64()),
    }
}
