use crate::task::Task;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

type Queue = mpsc::UnboundedReceiver<Box<dyn Task>>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    InvalidConcurrency,

    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("worker pool is closed")]
    Closed,
}

/// Runs queued tasks on a fixed number of workers.
///
/// Tasks may be queued before [`run`](Self::run). Once the run token is
/// cancelled no new tasks are accepted; workers finish everything already
/// queued and then exit, which is what [`wait`](Self::wait) observes.
pub struct WorkerPool {
    concurrency: usize,
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Box<dyn Task>>>>>,
    receiver: Mutex<Option<Queue>>,
    pending: Arc<watch::Sender<usize>>,
    token: OnceLock<CancellationToken>,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<Self, PoolError> {
        if concurrency == 0 {
            return Err(PoolError::InvalidConcurrency);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        Ok(Self {
            concurrency,
            sender: Arc::new(Mutex::new(Some(tx))),
            receiver: Mutex::new(Some(rx)),
            pending: Arc::new(pending),
            token: OnceLock::new(),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts the workers. Cancelling `token` closes the queue.
    pub fn run(&self, token: CancellationToken) -> Result<(), PoolError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(PoolError::AlreadyRunning)?;
        let _ = self.token.set(token.clone());

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        for id in 0..self.concurrency {
            tokio::spawn(worker(id, receiver.clone(), self.pending.clone()));
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            tracing::debug!("Worker pool queue closed");
        });

        tracing::info!(workers = self.concurrency, "Worker pool started");
        Ok(())
    }

    /// Queues a task.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once the run token has been cancelled.
    pub fn add_task(&self, task: Box<dyn Task>) -> Result<(), PoolError> {
        let mut sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.token.get().is_some_and(|t| t.is_cancelled()) {
            sender.take();
        }
        let tx = sender.as_ref().ok_or(PoolError::Closed)?;

        self.pending.send_modify(|n| *n += 1);
        if tx.send(task).is_err() {
            self.pending.send_modify(|n| *n -= 1);
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Number of queued or running tasks.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once every queued task has finished.
    pub async fn wait(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

async fn worker(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<Queue>>,
    pending: Arc<watch::Sender<usize>>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let name = task.name().to_string();
        // A separate tokio task turns a panic into a JoinError.
        match tokio::spawn(async move { task.process().await }).await {
            Ok(Ok(())) => tracing::debug!(worker = id, task = %name, "Task finished"),
            Ok(Err(e)) => tracing::warn!(worker = id, task = %name, error = %e, "Task failed"),
            Err(e) if e.is_panic() => {
                tracing::error!(worker = id, task = %name, "Task panicked")
            }
            Err(e) => tracing::warn!(worker = id, task = %name, error = %e, "Task aborted"),
        }
        pending.send_modify(|n| *n = n.saturating_sub(1));
    }
    tracing::debug!(worker = id, "Worker stopped");
}
