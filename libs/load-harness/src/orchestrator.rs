use std::sync::Arc;
use std::time::{Duration, Instant};

use broker_client::Inspector;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::HarnessError;
use crate::metrics::MetricsAggregator;
use crate::monitor::spawn_monitor;
use crate::plan::LoadPlan;
use crate::publisher::{PublisherOutcome, PublisherWorker};
use crate::report::Report;
use crate::subscriber::{SubscriberOutcome, SubscriberWorker};

// ═══════════════════════════════════════════════════════════════
//  Orchestrator
// ═══════════════════════════════════════════════════════════════

/// Проводит прогон целиком:
///
/// 1. монитор и subscriber'ы стартуют первыми;
/// 2. warm-up, чтобы подписки успели зарегистрироваться;
/// 3. publisher'ы стартуют одновременно и работают до конца;
/// 4. drain для задержавшихся доставок;
/// 5. subscriber'ы и монитор снимаются, замер эндпоинтов инспекции, отчёт.
///
/// Отмена `cancel` сокращает ожидания и останавливает воркеров; отчёт всё
/// равно строится по накопленным данным и помечается как прерванный.
pub struct Orchestrator {
    plan: LoadPlan,
    metrics: Arc<MetricsAggregator>,
}

impl Orchestrator {
    pub fn new(plan: LoadPlan) -> Self {
        Self {
            plan,
            metrics: Arc::new(MetricsAggregator::new()),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<Report, HarnessError> {
        let plan = &self.plan;
        plan.validate()?;

        // Publisher'ов строим заранее: ошибка конфигурации клиента фатальна.
        let publishers = (0..plan.publishers)
            .map(|id| PublisherWorker::new(id, plan, self.metrics.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let monitor_stop = CancellationToken::new();
        let monitor = spawn_monitor(
            self.metrics.clone(),
            plan.monitor_interval,
            plan.subscribers,
            monitor_stop.clone(),
        );

        // ── subscribers ──
        let subs_stop = cancel.child_token();
        let subscribers: Vec<JoinHandle<SubscriberOutcome>> = (0..plan.subscribers)
            .map(|id| {
                let worker = SubscriberWorker::new(id, plan, self.metrics.clone());
                tokio::spawn(worker.run(subs_stop.clone()))
            })
            .collect();
        tracing::info!(
            subscribers = plan.subscribers,
            window_secs = plan.observation_window().as_secs_f64(),
            "subscribers started"
        );

        pause(plan.warmup, &cancel).await;
        let (_, _, _, connected) = self.metrics.counters();
        tracing::info!(connected, expected = plan.subscribers, "warm-up done");

        // ── publishers ──
        let started = Instant::now();
        let handles: Vec<JoinHandle<PublisherOutcome>> = publishers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run(cancel.clone())))
            .collect();
        tracing::info!(publishers = plan.publishers, "publishers started");

        for handle in handles {
            match handle.await {
                Ok(out) => tracing::debug!(
                    publisher = out.id,
                    sent = out.sent,
                    errors = out.errors,
                    "publisher joined"
                ),
                Err(e) => tracing::error!(error = %e, "publisher task failed"),
            }
        }
        let elapsed = started.elapsed();
        tracing::info!(elapsed_secs = elapsed.as_secs_f64(), "publishing done");

        // ── drain ──
        pause(plan.drain, &cancel).await;
        subs_stop.cancel();
        for handle in subscribers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "subscriber task failed");
            }
        }

        monitor_stop.cancel();
        if tokio::time::timeout(plan.monitor_interval, monitor).await.is_err() {
            tracing::debug!("monitor did not stop in time");
        }

        let interrupted = cancel.is_cancelled();
        let inspection = if interrupted || plan.inspect_samples == 0 {
            Vec::new()
        } else {
            let inspector = Inspector::new(&plan.broker_url, plan.publish_timeout)?;
            inspector.probe_all(plan.inspect_samples).await
        };

        let snap = self.metrics.snapshot();
        Ok(Report::build(plan, &snap, elapsed, inspection, interrupted))
    }
}

/// Ждать `d` или отмены, что раньше.
async fn pause(d: Duration, cancel: &CancellationToken) {
    if d.is_zero() {
        return;
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(d) => {}
    }
}
