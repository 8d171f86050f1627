// AMQP broker plumbing: queue declaration, publish, consume

use anyhow::{Context, Result};
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use drover_core::Task;

/// One enqueued task-execution request. The `(task_id, workflow_id)` pair is
/// the option bag the failure sink uses to locate the record when execution
/// never got far enough to parse the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task: Task,
    pub task_id: String,
    pub workflow_id: String,
    /// Queue the message was published to; defers republish to it.
    pub queue: String,
    /// Failed-execution redeliveries so far.
    #[serde(default)]
    pub retries: u32,
    /// Upstream-not-ready re-enqueues so far; drives the defer backoff.
    #[serde(default)]
    pub deferrals: u32,
}

/// Routed to the failure sink after terminal delivery failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMessage {
    pub workflow_id: String,
    pub task_id: String,
    pub error: String,
}

/// Thin wrapper over one AMQP connection + channel
#[derive(Clone)]
pub struct Broker {
    // The channel dies with the connection, so the handle keeps both alive.
    _connection: Arc<Connection>,
    channel: Channel,
}

impl Broker {
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("Failed to connect to AMQP broker")?;
        let channel = connection
            .create_channel()
            .await
            .context("Failed to open AMQP channel")?;
        // One unacked delivery per consumer: a worker owns one task at a time.
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        Ok(Self {
            _connection: Arc::new(connection),
            channel,
        })
    }

    pub async fn declare_queue(&self, name: &str) -> Result<()> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to declare queue {name}"))?;
        Ok(())
    }

    /// Publish a persistent JSON message to a named queue, awaiting broker
    /// confirmation.
    pub async fn publish<T: Serialize>(&self, queue: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .with_context(|| format!("Failed to publish to queue {queue}"))?
            .await
            .with_context(|| format!("Broker did not confirm publish to {queue}"))?;
        Ok(())
    }

    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Consumer> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to start consumer on queue {queue}"))?;
        Ok(consumer)
    }
}
