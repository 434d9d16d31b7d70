use std::time::Duration;

use clap::Args;
use serde::Deserialize;

use load_harness::{Assignment, LoadPlan, Profile, RunMode, derive_ws_url};

use super::error::LoadError;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub broker_url: Option<String>,
    pub ws_url: Option<String>,
    pub profile: Option<Profile>,
    pub publishers: Option<usize>,
    pub subscribers: Option<usize>,
    pub messages: Option<u64>,
    pub duration_secs: Option<f64>,
    pub interval_ms: Option<u64>,
    pub topics: Option<Vec<String>>,
    pub assignment: Option<Assignment>,
    pub publish_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub warmup_secs: Option<f64>,
    pub drain_secs: Option<f64>,
    pub dwell_secs: Option<f64>,
    pub monitor_interval_secs: Option<u64>,
    pub inspect_samples: Option<usize>,
    pub report_json: Option<String>,
}

pub fn load_config(path: &str) -> Result<Config, LoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LoadError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| LoadError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct LoadArgs {
    /// Путь к pubsub-load.toml
    #[arg(long, default_value = "pubsub-load.toml", env = "PUBSUB_LOAD_CONFIG")]
    pub config: String,

    /// Базовый HTTP URL брокера
    #[arg(long = "broker", env = "PUBSUB_LOAD_BROKER")]
    pub broker_url: Option<String>,

    /// URL постоянного канала (по умолчанию выводится из --broker)
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Набор параметров по умолчанию: stress | perf
    #[arg(long)]
    pub profile: Option<Profile>,

    /// Число publisher'ов
    #[arg(long)]
    pub publishers: Option<usize>,

    /// Число subscriber'ов
    #[arg(long)]
    pub subscribers: Option<usize>,

    /// Сообщений на publisher (режим по количеству, приоритетнее --duration)
    #[arg(long)]
    pub messages: Option<u64>,

    /// Длительность публикации в секундах
    #[arg(long)]
    pub duration: Option<f64>,

    /// Пауза publisher'а после каждого вызова, мс
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Topics через запятую
    #[arg(long, value_delimiter = ',')]
    pub topics: Option<Vec<String>>,

    /// Назначение подписок: alternating | round-robin | wildcard
    #[arg(long)]
    pub assignment: Option<Assignment>,

    /// Таймаут publish-вызова, мс
    #[arg(long)]
    pub publish_timeout_ms: Option<u64>,

    /// Таймаут подключения канала, мс
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Пауза между стартом subscriber'ов и publisher'ов, с
    #[arg(long)]
    pub warmup: Option<f64>,

    /// Пауза после publisher'ов перед отчётом, с
    #[arg(long)]
    pub drain: Option<f64>,

    /// Окно наблюдения subscriber'а, с
    #[arg(long)]
    pub dwell: Option<f64>,

    /// Период строки прогресса, с
    #[arg(long)]
    pub monitor_interval: Option<u64>,

    /// Вызовов на каждый эндпоинт инспекции (0 = не замерять)
    #[arg(long)]
    pub inspect_samples: Option<usize>,

    /// Записать отчёт в JSON по этому пути
    #[arg(long)]
    pub report_json: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

fn secs(name: &str, v: f64) -> Result<Duration, LoadError> {
    Duration::try_from_secs_f64(v)
        .map_err(|_| LoadError::Config(format!("{name} must be a non-negative number of seconds")))
}

/// Итоговая конфигурация после мержа: defaults профиля < config.toml < env/CLI
pub struct Effective {
    pub profile: Profile,
    pub plan: LoadPlan,
    pub report_json: Option<String>,
}

impl Effective {
    pub fn new(args: &LoadArgs) -> Result<Self, LoadError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    fn merge(args: &LoadArgs, cfg: Config) -> Result<Self, LoadError> {
        let profile = args.profile.or(cfg.profile).unwrap_or(Profile::Stress);
        let mut plan = LoadPlan::for_profile(profile);

        if let Some(url) = args.broker_url.clone().or(cfg.broker_url) {
            plan.broker_url = url;
        }
        plan.ws_url = args
            .ws_url
            .clone()
            .or(cfg.ws_url)
            .unwrap_or_else(|| derive_ws_url(&plan.broker_url));

        if let Some(n) = args.publishers.or(cfg.publishers) {
            plan.publishers = n;
        }
        if let Some(n) = args.subscribers.or(cfg.subscribers) {
            plan.subscribers = n;
        }

        let messages = args.messages.or(cfg.messages);
        let duration = args.duration.or(cfg.duration_secs);
        if let Some(n) = messages {
            plan.mode = RunMode::Count(n);
        } else if let Some(d) = duration {
            plan.mode = RunMode::Duration(secs("duration", d)?);
        }

        if let Some(ms) = args.interval_ms.or(cfg.interval_ms) {
            plan.interval = Duration::from_millis(ms);
        }
        if let Some(topics) = args.topics.clone().or(cfg.topics) {
            plan.topics = topics.into_iter().map(|t| t.trim().to_string()).collect();
        }
        if let Some(a) = args.assignment.clone().or(cfg.assignment) {
            plan.assignment = a;
        }
        if let Some(ms) = args.publish_timeout_ms.or(cfg.publish_timeout_ms) {
            plan.publish_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = args.connect_timeout_ms.or(cfg.connect_timeout_ms) {
            plan.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(s) = args.warmup.or(cfg.warmup_secs) {
            plan.warmup = secs("warmup", s)?;
        }
        if let Some(s) = args.drain.or(cfg.drain_secs) {
            plan.drain = secs("drain", s)?;
        }
        if let Some(s) = args.dwell.or(cfg.dwell_secs) {
            plan.dwell = Some(secs("dwell", s)?);
        }
        if let Some(s) = args.monitor_interval.or(cfg.monitor_interval_secs) {
            plan.monitor_interval = Duration::from_secs(s);
        }
        if let Some(n) = args.inspect_samples.or(cfg.inspect_samples) {
            plan.inspect_samples = n;
        }

        plan.validate()?;

        Ok(Self {
            profile,
            plan,
            report_json: args.report_json.clone().or(cfg.report_json),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use broker_api::TopicPattern;
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: LoadArgs,
    }

    fn parse(argv: &[&str]) -> LoadArgs {
        let mut full = vec!["pubsub-load", "--config", "/nonexistent/pubsub-load.toml"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn defaults_follow_stress_profile() {
        let eff = Effective::new(&parse(&[])).unwrap();
        assert_eq!(eff.profile, Profile::Stress);
        assert_eq!(eff.plan.publishers, 10);
        assert_eq!(eff.plan.subscribers, 50);
        assert_eq!(eff.plan.ws_url, "ws://localhost:5000/ws");
        assert_eq!(eff.plan.mode, RunMode::Duration(Duration::from_secs(30)));
    }

    #[test]
    fn cli_overrides_profile() {
        let eff = Effective::new(&parse(&[
            "--profile",
            "perf",
            "--broker",
            "http://10.0.0.5:8080/",
            "--topics",
            "orders, shipping",
            "--assignment",
            "wildcard",
            "--messages",
            "7",
            "--duration",
            "99",
        ]))
        .unwrap();

        assert_eq!(eff.plan.publishers, 5);
        assert_eq!(eff.plan.ws_url, "ws://10.0.0.5:8080/ws");
        assert_eq!(eff.plan.topics, vec!["orders", "shipping"]);
        assert_eq!(eff.plan.pattern_for(1), TopicPattern::Wildcard);
        assert_eq!(eff.plan.mode, RunMode::Count(7));
    }

    #[test]
    fn file_sits_between_defaults_and_cli() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
profile = "perf"
subscribers = 3
duration_secs = 2.5
interval_ms = 20
assignment = {{ explicit = ["*", "orders"] }}
report_json = "out.json"
"#
        )
        .unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let args = TestCli::try_parse_from(["pubsub-load", "--config", &path, "--subscribers", "4"])
            .unwrap()
            .args;
        let eff = Effective::new(&args).unwrap();

        assert_eq!(eff.profile, Profile::Perf);
        assert_eq!(eff.plan.subscribers, 4);
        assert_eq!(eff.plan.mode, RunMode::Duration(Duration::from_millis(2500)));
        assert_eq!(eff.plan.interval, Duration::from_millis(20));
        assert_eq!(eff.plan.pattern_for(1), TopicPattern::Exact("orders".into()));
        assert_eq!(eff.report_json.as_deref(), Some("out.json"));
    }

    #[test]
    fn broken_existing_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "publishers = \"many\"").unwrap();
        let path = f.path().to_str().unwrap().to_string();
        let args = TestCli::try_parse_from(["pubsub-load", "--config", &path])
            .unwrap()
            .args;
        assert!(matches!(Effective::new(&args), Err(LoadError::Config(_))));
    }

    #[test]
    fn invalid_plan_is_rejected() {
        let res = Effective::new(&parse(&["--publishers", "0", "--subscribers", "0"]));
        assert!(matches!(res, Err(LoadError::Harness(_))));

        let res = Effective::new(&parse(&["--warmup=-1"]));
        assert!(matches!(res, Err(LoadError::Config(_))));
    }
}
