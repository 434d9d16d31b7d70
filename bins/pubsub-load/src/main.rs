mod cmd;

use clap::Parser;
use cmd::config::{Effective, LoadArgs};

#[derive(Parser)]
#[command(
    name = "pubsub-load",
    about = "Нагрузочный тест topic-based pub/sub брокера"
)]
struct Cli {
    #[command(flatten)]
    args: LoadArgs,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let eff = match Effective::new(&cli.args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cmd::run::run(&eff).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
