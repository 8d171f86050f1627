// Worker actor: broker consumer driving one task per delivery
//
// Every delivery terminates in exactly one of four ways:
// - deferred: upstream not settled, message republished (with backoff), acked
// - succeeded: record is `success`, outputs and log uploaded
// - skipped: workflow revoked, or upstream failed (failure recorded in place)
// - failed: error routed to the failure sink after MAX_RETRIES redeliveries
//
// Each path leaves the state store consistent: one status write per
// transition, every write an upsert on (parent, id).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use drover_core::{TaskError, TaskResult, TaskStatus};

use crate::aggregate::set_workflow_run_state;
use crate::broker::{FailureMessage, TaskMessage};
use crate::failure::{record_failure, spawn_failure_consumer};
use crate::runner::TaskRunner;
use crate::services::Services;
use crate::upstream::{check_upstream, UpstreamOutcome};

/// How a delivery resolved without routing to the failure sink
enum TaskFlow {
    Completed,
    Deferred,
    Skipped,
}

pub struct Worker {
    services: Arc<Services>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(services: Arc<Services>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            services,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run the worker, processing deliveries until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(
            queue = %self.services.settings.default_queue,
            "Starting worker"
        );

        let task_handle = spawn_task_consumer(self.services.clone(), self.shutdown_rx.clone());
        let failure_handle = spawn_failure_consumer(self.services.clone(), self.shutdown_rx.clone());

        // Wait for shutdown signal
        let mut shutdown_rx = self.shutdown_rx.clone();
        shutdown_rx.changed().await.ok();

        info!("Shutdown signal received, stopping consumers");
        let _ = tokio::join!(task_handle, failure_handle);

        info!("Worker stopped");
        Ok(())
    }

    /// Signal the worker to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Sender half of the shutdown signal, for wiring to ctrl-c.
    pub fn shutdown_sender(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }
}

/// Spawn the task-queue consumer loop
fn spawn_task_consumer(
    services: Arc<Services>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let queue = services.settings.default_queue.clone();
        let mut consumer = match services.broker.consume(&queue, "drover-worker").await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(error = %e, queue = %queue, "Failed to start task consumer");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Task consumer shutting down");
                    break;
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            if let Err(e) = handle_task_delivery(&services, delivery).await {
                                error!(error = %e, "Task delivery processing error");
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Task consumer error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => {
                            info!("Task consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Decode, process and ack one delivery. Publishing (defer, retry, failure
/// sink) happens before the ack so a crash can only cause redelivery, never
/// a lost task.
async fn handle_task_delivery(services: &Services, delivery: Delivery) -> Result<()> {
    let message: TaskMessage = match serde_json::from_slice(&delivery.data) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable task message");
            delivery.ack(BasicAckOptions::default()).await?;
            return Ok(());
        }
    };

    let span = tracing::info_span!(
        "task",
        delivery_tag = delivery.delivery_tag,
        task_id = %message.task_id,
        workflow_id = %message.workflow_id,
    );

    match process_task(services, &message).instrument(span).await {
        Ok(TaskFlow::Completed) | Ok(TaskFlow::Deferred) | Ok(TaskFlow::Skipped) => {}
        Err(error) => route_failure(services, &message, error).await,
    }

    delivery
        .ack(BasicAckOptions::default())
        .await
        .context("Failed to ack task delivery")?;
    Ok(())
}

async fn process_task(services: &Services, message: &TaskMessage) -> Result<TaskFlow> {
    let task = &message.task;
    info!(name = %task.name, "Running task");

    // Revocation gate: still-queued tasks of a revoked workflow are dropped
    // without execution, record left pending.
    if let Some(workflow) = services.db.get_workflow(&message.workflow_id).await? {
        if workflow.is_revoked {
            info!("Workflow revoked; dropping task without execution");
            return Ok(TaskFlow::Skipped);
        }
    }

    let siblings = services.db.find_tasks(&message.workflow_id).await?;

    // Redelivery guard: a settled task never leaves success or failure.
    if let Some(own) = siblings.iter().find(|row| row.id == task.id) {
        if own.status().is_terminal() {
            info!(status = %own.status(), "Task already settled; dropping duplicate delivery");
            return Ok(TaskFlow::Skipped);
        }
    }

    match check_upstream(task, &siblings) {
        UpstreamOutcome::UpstreamFailed { failed } => {
            let reason = TaskError::UpstreamFailed {
                task_id: task.id.clone(),
                failed_dependency: failed,
            };
            warn!(error = %reason, "Task cannot proceed due to upstream failure");
            services
                .db
                .set_task_status(
                    &message.workflow_id,
                    &task.id,
                    TaskStatus::Failure,
                    Some(&TaskResult::from_message(reason.to_string())),
                )
                .await?;
            set_workflow_run_state(&services.db, &message.workflow_id).await?;
            return Ok(TaskFlow::Skipped);
        }
        UpstreamOutcome::Deferred { pending } => {
            info!(pending = ?pending, "Upstream not settled; re-enqueueing");
            tokio::time::sleep(defer_backoff(message.deferrals)).await;
            let mut requeued = message.clone();
            requeued.deferrals += 1;
            services.broker.publish(&message.queue, &requeued).await?;
            return Ok(TaskFlow::Deferred);
        }
        UpstreamOutcome::Proceed => {}
    }

    services
        .db
        .set_task_status(&message.workflow_id, &task.id, TaskStatus::Running, None)
        .await?;
    set_workflow_run_state(&services.db, &message.workflow_id).await?;

    let workdir = task.workdir(&services.settings.data_dir, &message.workflow_id);
    tokio::fs::create_dir_all(&workdir)
        .await
        .with_context(|| format!("Failed to create workdir {}", workdir.display()))?;

    let runner = TaskRunner::new(&services.artifacts, &services.settings);
    match runner.run(task, &message.workflow_id, &workdir).await {
        Ok(log) => {
            services
                .db
                .set_task_status(
                    &message.workflow_id,
                    &task.id,
                    TaskStatus::Success,
                    Some(&TaskResult::from_log(log)),
                )
                .await?;
            set_workflow_run_state(&services.db, &message.workflow_id).await?;

            if task.options.on_finish_remove_local_dir {
                if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
                    warn!(error = %e, "Failed to clean up working directory");
                }
            }

            info!("Task finished successfully");
            Ok(TaskFlow::Completed)
        }
        Err(error) => {
            if task.options.on_fail_remove_local_dir {
                if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
                    warn!(error = %e, "Failed to clean up working directory");
                }
            }
            Err(error.into())
        }
    }
}

/// Re-enqueue a failed execution while retries remain, otherwise hand it to
/// the failure sink.
async fn route_failure(services: &Services, message: &TaskMessage, error: anyhow::Error) {
    if message.retries < services.settings.max_retries {
        warn!(
            error = %error,
            retries = message.retries,
            "Execution failed; re-enqueueing for retry"
        );
        tokio::time::sleep(defer_backoff(message.retries)).await;
        let mut retried = message.clone();
        retried.retries += 1;
        match services.broker.publish(&message.queue, &retried).await {
            Ok(()) => return,
            Err(e) => error!(error = %e, "Failed to re-enqueue; routing to failure sink"),
        }
    }

    let failure = FailureMessage {
        workflow_id: message.workflow_id.clone(),
        task_id: message.task_id.clone(),
        error: format!("{error:#}"),
    };
    if let Err(e) = services
        .broker
        .publish(&services.settings.failure_queue(), &failure)
        .await
    {
        error!(error = %e, "Failed to publish to failure sink; recording failure in place");
        // Last resort so the task does not hang in `running`.
        if let Err(e) = record_failure(&services.db, &failure).await {
            error!(error = %e, "Failed to record task failure");
        }
    }
}

/// Bounded exponential backoff before a re-enqueue: 1, 2, 4, ... capped at
/// 30 seconds.
fn defer_backoff(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt.min(5)).unwrap_or(32).min(30);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(defer_backoff(0), Duration::from_secs(1));
        assert_eq!(defer_backoff(1), Duration::from_secs(2));
        assert_eq!(defer_backoff(3), Duration::from_secs(8));
        assert_eq!(defer_backoff(4), Duration::from_secs(16));
        assert_eq!(defer_backoff(5), Duration::from_secs(30));
        assert_eq!(defer_backoff(100), Duration::from_secs(30));
    }
}
