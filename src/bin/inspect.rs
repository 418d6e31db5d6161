//! Build the dependency map once and print it (JSON, dashboard YAML, alerts, or a summary).

use anyhow::Result;
use automation_inspector::alerts::collect_alerts;
use automation_inspector::dashboard::render_dashboard;
use automation_inspector::{Config, GraphBuilder, GraphSource, HomeAssistantClient, PlatformApi};
use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
    Alerts,
    Summary,
}

#[derive(Parser, Debug)]
#[command(name = "inspect")]
#[command(about = "Build the automation dependency map once and print it")]
struct Args {
    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: Format,

    /// Override the staleness threshold in days
    #[arg(long)]
    stale_days: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "warn"),
    )
    .init();

    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(days) = args.stale_days {
        config.health.stale_threshold_days = days;
        config.validate()?;
    }

    let client: Arc<dyn PlatformApi> = Arc::new(HomeAssistantClient::from_config(&config)?);
    let builder = GraphBuilder::from_config(client, &config);

    let start = Instant::now();
    let graph = builder.build().await?;
    let elapsed = start.elapsed();

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
        Format::Yaml => print!("{}", render_dashboard(&graph)?),
        Format::Alerts => {
            let alerts = collect_alerts(&graph, &BTreeSet::new());
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        }
        Format::Summary => {
            println!("\n=== Automation Inspector ===\n");
            println!("{:<28} {:>6}", "Automations", graph.summary.total);
            println!("{:<28} {:>6}", "With unknown trigger refs", graph.summary.with_unknown);
            println!("{:<28} {:>6}", "With offline group members", graph.summary.with_offline);
            println!(
                "{:<28} {:>6}",
                format!("Stale (>= {} days)", config.health.stale_threshold_days),
                graph.summary.stale
            );
            println!("{:<28} {:>6}", "Orphaned helpers", graph.orphans.len());
            if !graph.failed.is_empty() {
                println!("{:<28} {:>6}", "Skipped (failed)", graph.failed.len());
            }
            println!("\nBuilt in {:?}", elapsed);

            if !graph.orphans.is_empty() {
                println!("\nOrphaned helpers:");
                for orphan in &graph.orphans {
                    println!("  - {}", orphan);
                }
            }
        }
    }

    Ok(())
}
