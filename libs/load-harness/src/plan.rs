use std::time::Duration;

use broker_api::TopicPattern;
use serde::Deserialize;

use crate::error::HarnessError;

/// Когда publisher останавливается.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Фиксированное число сообщений на publisher.
    Count(u64),
    /// Фиксированная длительность публикации.
    Duration(Duration),
}

/// Правило назначения паттерна подписки по индексу subscriber'а.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Assignment {
    /// Чётные получают `*`, нечётные `topics[i % len]`.
    Alternating,
    /// Каждый получает `topics[i % len]`.
    RoundRobin,
    /// Все на `*`.
    Wildcard,
    /// Явный список паттернов, по кругу.
    Explicit(Vec<TopicPattern>),
}

/// Готовые наборы параметров.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Длительная нагрузка: 10 publishers × 50 subscribers, 30 s, ~100 msg/s на publisher.
    Stress,
    /// Замер latency: 5 publishers × 10 subscribers, по 100 сообщений без пауз.
    Perf,
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stress" => Ok(Profile::Stress),
            "perf" => Ok(Profile::Perf),
            other => Err(format!("unknown profile '{other}' (stress, perf)")),
        }
    }
}

impl std::str::FromStr for Assignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alternating" => Ok(Assignment::Alternating),
            "round-robin" => Ok(Assignment::RoundRobin),
            "wildcard" => Ok(Assignment::Wildcard),
            other => Err(format!(
                "unknown assignment '{other}' (alternating, round-robin, wildcard)"
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  LoadPlan
// ═══════════════════════════════════════════════════════════════

/// Статическая конфигурация прогона. Не меняется после старта;
/// воркеры получают из неё только свои срезы.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub broker_url: String,
    pub ws_url: String,
    pub publishers: usize,
    pub subscribers: usize,
    pub mode: RunMode,
    /// Пауза после каждого publish-вызова.
    pub interval: Duration,
    pub topics: Vec<String>,
    pub assignment: Assignment,
    pub publish_timeout: Duration,
    pub connect_timeout: Duration,
    pub warmup: Duration,
    pub drain: Duration,
    /// Явное окно наблюдения subscriber'ов; при `None` вычисляется.
    pub dwell: Option<Duration>,
    pub monitor_interval: Duration,
    pub inspect_samples: usize,
}

pub const DEFAULT_BROKER_URL: &str = "http://localhost:5000";

impl LoadPlan {
    pub fn for_profile(profile: Profile) -> Self {
        let broker_url = DEFAULT_BROKER_URL.to_string();
        let ws_url = derive_ws_url(&broker_url);
        match profile {
            Profile::Stress => Self {
                broker_url,
                ws_url,
                publishers: 10,
                subscribers: 50,
                mode: RunMode::Duration(Duration::from_secs(30)),
                interval: Duration::from_millis(10),
                topics: (0..5).map(|i| format!("topic{i}")).collect(),
                assignment: Assignment::Alternating,
                publish_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_secs(10),
                warmup: Duration::from_secs(5),
                drain: Duration::from_secs(5),
                dwell: None,
                monitor_interval: Duration::from_secs(5),
                inspect_samples: 10,
            },
            Profile::Perf => Self {
                broker_url,
                ws_url,
                publishers: 5,
                subscribers: 10,
                mode: RunMode::Count(100),
                interval: Duration::ZERO,
                topics: (1..=5).map(|i| format!("topic{i}")).collect(),
                assignment: Assignment::RoundRobin,
                publish_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(10),
                warmup: Duration::from_secs(3),
                drain: Duration::from_secs(5),
                dwell: Some(Duration::from_secs(30)),
                monitor_interval: Duration::from_secs(5),
                inspect_samples: 10,
            },
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.topics.is_empty() {
            return Err(HarnessError::Config("topic set is empty".into()));
        }
        if self.topics.iter().any(|t| t.is_empty()) {
            return Err(HarnessError::Config("topic names must not be empty".into()));
        }
        if self.publishers == 0 && self.subscribers == 0 {
            return Err(HarnessError::Config("no publishers and no subscribers".into()));
        }
        if self.monitor_interval.is_zero() {
            return Err(HarnessError::Config("monitor interval must be at least 1s".into()));
        }
        if self.publish_timeout.is_zero() {
            return Err(HarnessError::Config("publish timeout must be positive".into()));
        }
        if let Assignment::Explicit(patterns) = &self.assignment {
            if patterns.is_empty() {
                return Err(HarnessError::Config("explicit assignment has no patterns".into()));
            }
        }
        Ok(())
    }

    /// Topic для сообщения `seq`: round-robin по набору.
    pub fn topic_for(&self, seq: u64) -> &str {
        &self.topics[(seq % self.topics.len() as u64) as usize]
    }

    pub fn pattern_for(&self, subscriber: usize) -> TopicPattern {
        let exact = || TopicPattern::Exact(self.topics[subscriber % self.topics.len()].clone());
        match &self.assignment {
            Assignment::Alternating if subscriber % 2 == 0 => TopicPattern::Wildcard,
            Assignment::Alternating | Assignment::RoundRobin => exact(),
            Assignment::Wildcard => TopicPattern::Wildcard,
            Assignment::Explicit(patterns) => patterns[subscriber % patterns.len()].clone(),
        }
    }

    /// Оценка длительности фазы публикации.
    pub fn publish_estimate(&self) -> Duration {
        match self.mode {
            RunMode::Duration(d) => d,
            RunMode::Count(n) => self.interval.saturating_mul(n.min(u32::MAX as u64) as u32),
        }
    }

    /// Сколько subscriber держит соединение: warm-up + публикация + drain.
    ///
    /// Это верхняя граница: оркестратор снимает subscriber'ов сразу после drain.
    pub fn observation_window(&self) -> Duration {
        self.dwell
            .unwrap_or_else(|| self.warmup + self.publish_estimate() + self.drain)
    }

    /// Суммарная целевая скорость, msg/s; `None` без паузы между вызовами.
    pub fn target_rate(&self) -> Option<f64> {
        (!self.interval.is_zero())
            .then(|| self.publishers as f64 / self.interval.as_secs_f64())
    }
}

/// `http://host:port` → `ws://host:port/ws`, `https` → `wss`.
pub fn derive_ws_url(broker_url: &str) -> String {
    let base = broker_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/ws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternating_assignment() {
        let plan = LoadPlan::for_profile(Profile::Stress);
        assert_eq!(plan.pattern_for(0), TopicPattern::Wildcard);
        assert_eq!(plan.pattern_for(1), TopicPattern::Exact("topic1".into()));
        assert_eq!(plan.pattern_for(2), TopicPattern::Wildcard);
        assert_eq!(plan.pattern_for(7), TopicPattern::Exact("topic2".into()));
    }

    #[test]
    fn round_robin_assignment_and_topics() {
        let plan = LoadPlan::for_profile(Profile::Perf);
        assert_eq!(plan.pattern_for(0), TopicPattern::Exact("topic1".into()));
        assert_eq!(plan.pattern_for(6), TopicPattern::Exact("topic2".into()));
        assert_eq!(plan.topic_for(0), "topic1");
        assert_eq!(plan.topic_for(4), "topic5");
        assert_eq!(plan.topic_for(5), "topic1");
    }

    #[test]
    fn explicit_assignment_cycles() {
        let mut plan = LoadPlan::for_profile(Profile::Perf);
        plan.assignment = Assignment::Explicit(vec!["*".into(), "orders".into()]);
        assert_eq!(plan.pattern_for(0), TopicPattern::Wildcard);
        assert_eq!(plan.pattern_for(1), TopicPattern::Exact("orders".into()));
        assert_eq!(plan.pattern_for(2), TopicPattern::Wildcard);
    }

    #[test]
    fn windows_and_rates() {
        let plan = LoadPlan::for_profile(Profile::Stress);
        assert_eq!(plan.observation_window(), Duration::from_secs(40));
        assert_eq!(plan.target_rate(), Some(1000.0));

        let perf = LoadPlan::for_profile(Profile::Perf);
        assert_eq!(perf.observation_window(), Duration::from_secs(30));
        assert_eq!(perf.target_rate(), None);
        assert_eq!(perf.publish_estimate(), Duration::ZERO);
    }

    #[test]
    fn validation_rejects_degenerate_plans() {
        let mut plan = LoadPlan::for_profile(Profile::Perf);
        assert!(plan.validate().is_ok());

        plan.topics.clear();
        assert!(plan.validate().is_err());

        let mut plan = LoadPlan::for_profile(Profile::Perf);
        plan.publishers = 0;
        plan.subscribers = 0;
        assert!(plan.validate().is_err());

        let mut plan = LoadPlan::for_profile(Profile::Perf);
        plan.topics.push(String::new());
        assert!(plan.validate().is_err());
    }

    #[test]
    fn ws_url_derivation() {
        assert_eq!(derive_ws_url("http://localhost:5000"), "ws://localhost:5000/ws");
        assert_eq!(derive_ws_url("https://broker.example/"), "wss://broker.example/ws");
    }

    #[test]
    fn names_parse() {
        assert_eq!("perf".parse::<Profile>(), Ok(Profile::Perf));
        assert_eq!("round-robin".parse::<Assignment>(), Ok(Assignment::RoundRobin));
        assert!("bogus".parse::<Assignment>().is_err());
    }
}
