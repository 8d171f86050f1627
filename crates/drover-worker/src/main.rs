use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover_core::Settings;
use drover_worker::{Services, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drover_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("drover-worker starting...");

    let settings = Settings::from_env();
    let services = Services::init(settings).await?;
    let worker = Worker::new(Arc::new(services));

    // ctrl-c flips the shutdown signal; run() returns once the consumers stop
    let shutdown = worker.shutdown_sender();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        let _ = shutdown.send(true);
    });

    worker.run().await
}
