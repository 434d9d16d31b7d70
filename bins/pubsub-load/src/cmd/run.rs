use std::fs::File;
use std::io::BufWriter;

use tokio_util::sync::CancellationToken;

use load_harness::{LoadPlan, Orchestrator, Report, describe_mode};

use super::config::Effective;
use super::error::LoadError;

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(eff: &Effective) -> Result<(), LoadError> {
    print_banner(eff);

    let token = CancellationToken::new();

    // --- Ctrl+C: воркеры уходят в teardown, отчёт всё равно печатается ---
    let interrupt = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupted, stopping workers...");
                interrupt.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    let report = Orchestrator::new(eff.plan.clone()).run(token).await?;
    println!("{}", report.render());

    if let Some(ref path) = eff.report_json {
        write_json(&report, path)?;
        tracing::info!(path = %path, "report written");
    }
    Ok(())
}

fn print_banner(eff: &Effective) {
    let plan: &LoadPlan = &eff.plan;
    println!("Starting load test ({:?} profile)", eff.profile);
    println!("  Broker:      {} | channel {}", plan.broker_url, plan.ws_url);
    println!("  Publishers:  {} ({})", plan.publishers, describe_mode(plan));
    println!("  Subscribers: {}", plan.subscribers);
    println!("  Topics:      {}", plan.topics.join(", "));
    match plan.target_rate() {
        Some(rate) => println!("  Target rate: {rate:.0} msg/s"),
        None => println!("  Target rate: unthrottled"),
    }
}

fn write_json(report: &Report, path: &str) -> Result<(), LoadError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(())
}
