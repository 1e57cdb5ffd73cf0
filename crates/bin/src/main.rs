//! Arkiva Outbox Relay
//!
//! Headless worker that relays committed business events from the outbox
//! table to the message broker, exactly-once-in-effect.

mod config;

use std::sync::Arc;

use arkiva_relay_infrastructure::messaging::{NatsConfig, NatsPublisher};
use arkiva_relay_infrastructure::persistence::PostgresOutboxStore;
use arkiva_relay_infrastructure::relay::{MessageDispatcher, RelayProcessor, RelayWorker};
use clap::Parser;
use config::RelayConfig;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// CLI arguments for arkiva-relay
#[derive(clap::Parser, Debug)]
#[command(name = "arkiva-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Arkiva outbox relay worker", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging(args.debug);

    // Configuration errors are fatal here, before anything touches the
    // network.
    let config = RelayConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.require_database_url()?)
        .await?;

    let store = Arc::new(PostgresOutboxStore::new(pool));
    store.run_migrations().await?;

    let router = config.topic_router();
    let publisher = NatsPublisher::connect(NatsConfig::with_url(config.require_broker_url()?)).await?;
    for topic in router.topics() {
        publisher.ensure_stream(topic).await?;
    }

    let dispatcher = MessageDispatcher::new(router, Arc::new(publisher));
    let processor = Arc::new(RelayProcessor::new(store, dispatcher, config.retry_policy()));
    let worker = RelayWorker::new(processor, config.worker_config());

    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully...");
    worker.shutdown();
    handle.await?;

    Ok(())
}

/// Setup logging based on debug flag.
fn setup_logging(debug: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
