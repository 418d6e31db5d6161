use automation_inspector::server::InspectorServer;
use automation_inspector::{Config, GraphBuilder, GraphCache, GraphSource, HomeAssistantClient, PlatformApi};
use std::sync::Arc;
use anyhow::Result;

fn init_logging(config: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.inspector.log_level)
    ).init();
}

/// Build the graph source shared by every command.
fn build_graph_builder(config: &Config) -> Result<GraphBuilder> {
    let client: Arc<dyn PlatformApi> = Arc::new(HomeAssistantClient::from_config(config)?);
    Ok(GraphBuilder::from_config(client, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config);

    match &config.source {
        Some(path) => log::info!("Loaded configuration from {}", path.display()),
        None => log::info!("No config file found, using defaults"),
    }

    // Parse command-line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "build" => {
            // One-shot build, JSON to stdout
            run_build(&config).await?;
        }
        "serve" | _ => {
            run_server(config).await?;
        }
    }

    Ok(())
}

/// Warm the cache, start the background refresher, and serve HTTP
async fn run_server(config: Config) -> Result<()> {
    log::info!("Starting Automation Inspector v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Platform API: {}", config.platform.base_url);
    log::info!(
        "Refresh every {}s, stale after {} days",
        config.cache.refresh_interval_secs,
        config.health.stale_threshold_days
    );

    let builder = build_graph_builder(&config)?;
    let cache = Arc::new(GraphCache::new(Arc::new(builder), config.refresh_interval()));

    // Serving starts even if the first build fails; readers see "not ready"
    // until a later build succeeds.
    match cache.warm().await {
        Ok(snap) => log::info!(
            "Initial dependency map ready ({} automations)",
            snap.graph.summary.total
        ),
        Err(e) => log::error!("Initial build failed: {}", e),
    }

    let _refresher = cache.spawn_refresher();

    let server = InspectorServer::new(Arc::clone(&cache), config.http_server.allowed_origins.clone());
    server.run(&config.bind_addr()).await?;

    Ok(())
}

/// Build once and print the dependency map
async fn run_build(config: &Config) -> Result<()> {
    let builder = build_graph_builder(config)?;
    let graph = builder.build().await?;
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}
