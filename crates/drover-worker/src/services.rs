// Process-wide service handles
//
// Broker, state store and artifact store are connected once at boot and
// injected into components; no ambient globals.

use anyhow::{Context, Result};

use drover_core::Settings;
use drover_storage::Database;

use crate::artifacts::ArtifactStore;
use crate::broker::Broker;

pub struct Services {
    pub settings: Settings,
    pub db: Database,
    pub broker: Broker,
    pub artifacts: ArtifactStore,
}

impl Services {
    /// Connect every external collaborator and prepare queues and bucket.
    pub async fn init(settings: Settings) -> Result<Self> {
        let db = Database::from_url(&settings.database_url)
            .await
            .context("Failed to connect to database")?;
        db.migrate().await.context("Failed to run migrations")?;
        tracing::info!("Connected to database");

        let broker = Broker::connect(&settings.amqp_url).await?;
        broker.declare_queue(&settings.default_queue).await?;
        broker.declare_queue(&settings.failure_queue()).await?;
        tracing::info!(queue = %settings.default_queue, "Connected to broker");

        let artifacts = ArtifactStore::new(&settings);
        artifacts.ensure_bucket().await?;
        tracing::info!(bucket = %settings.s3_bucket, "Artifact store ready");

        Ok(Self {
            settings,
            db,
            broker,
            artifacts,
        })
    }
}
