//! Serialized executor for daemon-mutating swarm operations.
//!
//! The overlay daemon's command-line interface is not safe for concurrent
//! invocation from one controlling process, so every join/leave/handshake
//! goes through a single worker task fed by a bounded queue — at most one
//! operation executes at any instant. Read-only status queries bypass this
//! runner entirely.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use swarmkeeper_p2p::CommandOutcome;

type TaskFuture = Pin<Box<dyn Future<Output = CommandOutcome> + Send>>;

struct SwarmTask {
    label: String,
    work: TaskFuture,
    respond_to: oneshot::Sender<CommandOutcome>,
}

/// Infrastructure failure: the worker is gone, so nothing can execute.
/// The current tick logs this and skips its remaining operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("swarm operation queue is closed")]
    QueueClosed,
}

/// Handle for submitting operations to the capacity-1 worker.
///
/// The worker exits when every handle has been dropped.
#[derive(Clone)]
pub struct TaskRunner {
    tx: mpsc::Sender<SwarmTask>,
}

impl TaskRunner {
    /// Spawn the worker task and return a submission handle plus the
    /// worker's join handle.
    pub fn start(queue_depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<SwarmTask>(queue_depth);
        let handle = tokio::spawn(worker(rx));
        (Self { tx }, handle)
    }

    /// Enqueue one operation; the returned receiver resolves with its
    /// outcome once the worker has executed it.
    pub async fn submit<F>(
        &self,
        label: impl Into<String>,
        work: F,
    ) -> Result<oneshot::Receiver<CommandOutcome>, RunnerError>
    where
        F: Future<Output = CommandOutcome> + Send + 'static,
    {
        let (respond_to, rx) = oneshot::channel();
        let task = SwarmTask {
            label: label.into(),
            work: Box::pin(work),
            respond_to,
        };
        self.tx.send(task).await.map_err(|_| RunnerError::QueueClosed)?;
        Ok(rx)
    }
}

async fn worker(mut rx: mpsc::Receiver<SwarmTask>) {
    while let Some(task) = rx.recv().await {
        tracing::debug!(op = %task.label, "executing swarm operation");
        let outcome = task.work.await;
        if task.respond_to.send(outcome).is_err() {
            tracing::debug!(op = %task.label, "completion receiver dropped");
        }
    }
    tracing::debug!("swarm operation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn outcome_is_delivered_to_the_submitter() {
        let (runner, worker) = TaskRunner::start(4);
        let rx = runner
            .submit("join h1", async { CommandOutcome::ok("joined") })
            .await
            .expect("submit");
        let outcome = rx.await.expect("outcome");
        assert!(outcome.success);
        assert_eq!(outcome.detail, "joined");
        drop(runner);
        worker.await.expect("worker");
    }

    #[tokio::test]
    async fn operations_never_overlap() {
        let (runner, worker) = TaskRunner::start(8);
        let events = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let events = events.clone();
            let rx = runner
                .submit("op", async move {
                    events.lock().unwrap().push("start");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    events.lock().unwrap().push("end");
                    CommandOutcome::ok("")
                })
                .await
                .expect("submit");
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.expect("outcome");
        }

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start", "end", "start", "end", "start", "end"],
            "a start must never appear before the previous end"
        );
        drop(runner);
        worker.await.expect("worker");
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (runner, worker) = TaskRunner::start(8);
        let order = Arc::new(Mutex::new(Vec::<usize>::new()));

        let mut receivers = Vec::new();
        for n in 0..4 {
            let order = order.clone();
            let rx = runner
                .submit(format!("op {n}"), async move {
                    order.lock().unwrap().push(n);
                    CommandOutcome::ok("")
                })
                .await
                .expect("submit");
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.expect("outcome");
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        drop(runner);
        worker.await.expect("worker");
    }

    #[tokio::test]
    async fn submit_after_worker_stopped_reports_queue_closed() {
        let (runner, worker) = TaskRunner::start(1);
        worker.abort();
        let _ = worker.await;

        let result = runner.submit("op", async { CommandOutcome::ok("") }).await;
        assert!(matches!(result, Err(RunnerError::QueueClosed)));
    }
}
