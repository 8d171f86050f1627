// Failure sink: the single authoritative `failure` write
//
// Invoked for messages the worker routed to the failure queue after terminal
// delivery failure. The message's option bag locates the record; the error
// text becomes the task's result message.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use lapin::options::BasicAckOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use drover_core::{TaskResult, TaskStatus};
use drover_storage::Database;

use crate::aggregate::set_workflow_run_state;
use crate::broker::FailureMessage;
use crate::services::Services;

/// Record the failure and recompute the parent workflow's status.
pub async fn record_failure(db: &Database, message: &FailureMessage) -> Result<()> {
    error!(
        task_id = %message.task_id,
        workflow_id = %message.workflow_id,
        error = %message.error,
        "Recording task failure"
    );

    db.set_task_status(
        &message.workflow_id,
        &message.task_id,
        TaskStatus::Failure,
        Some(&TaskResult::from_message(message.error.clone())),
    )
    .await?;
    set_workflow_run_state(db, &message.workflow_id).await?;
    Ok(())
}

/// Consume the failure queue until shutdown.
pub(crate) fn spawn_failure_consumer(
    services: Arc<Services>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let queue = services.settings.failure_queue();
        let mut consumer = match services.broker.consume(&queue, "drover-failure-sink").await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(error = %e, queue = %queue, "Failed to start failure consumer");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Failure consumer shutting down");
                    break;
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            match serde_json::from_slice::<FailureMessage>(&delivery.data) {
                                Ok(message) => {
                                    if let Err(e) = record_failure(&services.db, &message).await {
                                        error!(error = %e, "Failed to record task failure");
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "Dropping undecodable failure message");
                                }
                            }
                            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                                error!(error = %e, "Failed to ack failure message");
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Failure consumer error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => {
                            info!("Failure consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }
    })
}
