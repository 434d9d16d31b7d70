//! Нагрузочный harness для topic-based pub/sub брокера.
//!
//! Publisher'ы шлют сообщения request/response вызовом, subscriber'ы держат
//! постоянные соединения и считают доставки и latency. Все счётчики живут
//! в одном `MetricsAggregator`; монитор и отчёт только читают его снимки.

pub mod error;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod plan;
pub mod publisher;
pub mod report;
pub mod subscriber;

pub use broker_client::ChannelExit;
pub use error::HarnessError;
pub use metrics::{AggregateSnapshot, Counter, MetricsAggregator};
pub use monitor::{MonitorTick, spawn_monitor};
pub use orchestrator::Orchestrator;
pub use plan::{Assignment, LoadPlan, Profile, RunMode, derive_ws_url};
pub use publisher::{PublishRecord, PublisherOutcome, PublisherWorker};
pub use report::{LatencyStats, Report, SubscriberCount, describe_mode, percentile, success_rate};
pub use subscriber::{ReceptionEvent, SubscriberOutcome, SubscriberState, SubscriberWorker};
