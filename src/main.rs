/// Worksheet market server
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worksheet_market::{jobs, metrics, server, AppContext, MarketResult, ServerConfig};

#[tokio::main]
async fn main() -> MarketResult<()> {
    // Configuration first so logging can honour it
    let config = ServerConfig::from_env()?;

    init_tracing(&config.logging.level, config.logging.json);
    metrics::mark_started();

    tracing::info!(version = %config.service.version, "Starting worksheet market");

    let ctx = Arc::new(AppContext::new(config).await?);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("worksheet_market={},tower_http=debug", level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
