use std::sync::Arc;

use anyhow::Context;
use imgharvest_engine::config::load_settings_from_env;
use imgharvest_engine::crawler::BingCrawler;
use imgharvest_web::telemetry::init_tracing;
use imgharvest_web::{AppState, HarvestServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = load_settings_from_env().context("loading settings")?;
    let crawler = BingCrawler::new(settings.crawler.clone());
    let state = AppState::new(
        Arc::new(crawler),
        settings.policy.clone(),
        settings.server.max_ready_archives,
    );

    let server = HarvestServer::start(state, &settings.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.server.bind_addr))?;
    println!("Open {} in a browser", server.url("/"));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    server.shutdown().await;
    Ok(())
}
