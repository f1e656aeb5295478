//! Bounded worker pool with recursive task submission.
//!
//! Tasks are boxed futures pulled from a bounded queue by a fixed number of
//! workers. A running task may submit more tasks; the pool is finished once
//! no task is queued, none is running and no producer is still seeding
//! ("done when all idle"). The first task error wins: it is kept, later
//! errors are dropped and queued tasks are discarded without running.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::TransferError;

pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send>>;

/// Keeps the first error reported by any task.
#[derive(Debug, Default)]
pub(crate) struct ErrorCollector {
    flagged: AtomicBool,
    first: std::sync::Mutex<Option<TransferError>>,
}

impl ErrorCollector {
    pub fn report(&self, err: TransferError) {
        if let Ok(mut slot) = self.first.lock() {
            if slot.is_none() {
                *slot = Some(err);
            } else {
                debug!(error = %err, "dropping error after the first");
            }
        }
        self.flagged.store(true, Ordering::Release);
    }

    pub fn has_error(&self) -> bool {
        self.flagged.load(Ordering::Acquire)
    }

    fn take(&self) -> Option<TransferError> {
        self.first.lock().ok().and_then(|mut slot| slot.take())
    }
}

struct PoolInner {
    tx: mpsc::Sender<TaskFuture>,
    rx: Mutex<mpsc::Receiver<TaskFuture>>,
    /// Queued plus running tasks plus live producers.
    pending: AtomicUsize,
    idle: CancellationToken,
    errors: ErrorCollector,
    workers: usize,
}

impl PoolInner {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.cancel();
        }
    }
}

/// Cloneable handle to the pool; clones share one queue.
#[derive(Clone)]
pub(crate) struct TaskPool {
    inner: Arc<PoolInner>,
}

/// Keeps the pool from going idle while a producer is still seeding.
pub(crate) struct ProducerGuard {
    inner: Arc<PoolInner>,
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.inner.finish_one();
    }
}

impl TaskPool {
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(PoolInner {
                tx,
                rx: Mutex::new(rx),
                pending: AtomicUsize::new(0),
                idle: CancellationToken::new(),
                errors: ErrorCollector::default(),
                workers: workers.max(1),
            }),
        }
    }

    /// Registers a producer. Must be taken before [`run`](Self::run) starts.
    pub fn producer(&self) -> ProducerGuard {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        ProducerGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Queues a task, waiting while the queue is full.
    ///
    /// Only for producers outside the pool: a worker waiting here can
    /// deadlock the pool.
    pub async fn add_task(&self, task: TaskFuture) -> Result<(), TransferError> {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        if self.inner.tx.send(task).await.is_err() {
            self.inner.finish_one();
            return Err(TransferError::Pool("task queue closed".into()));
        }
        Ok(())
    }

    /// Queues a task without waiting. When the queue is full the task is
    /// handed back and the caller should run it inline.
    pub fn try_add_task(&self, task: TaskFuture) -> Result<(), TaskFuture> {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        match self.inner.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task))
            | Err(mpsc::error::TrySendError::Closed(task)) => {
                self.inner.finish_one();
                Err(task)
            }
        }
    }

    pub fn has_error(&self) -> bool {
        self.inner.errors.has_error()
    }

    pub fn report(&self, err: TransferError) {
        self.inner.errors.report(err);
    }

    /// Runs workers until the pool is idle. Returns the first task error.
    pub async fn run(&self) -> Result<(), TransferError> {
        if self.inner.pending.load(Ordering::Acquire) == 0 {
            self.inner.idle.cancel();
        }

        let mut workers = JoinSet::new();
        for id in 0..self.inner.workers {
            workers.spawn(worker_loop(id, Arc::clone(&self.inner)));
        }
        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                self.inner.errors.report(TransferError::Pool(e.to_string()));
            }
        }

        match self.inner.errors.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn worker_loop(id: usize, inner: Arc<PoolInner>) {
    loop {
        let task = {
            let mut rx = inner.rx.lock().await;
            tokio::select! {
                _ = inner.idle.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = task else {
            break;
        };

        if inner.errors.has_error() {
            inner.finish_one();
            continue;
        }

        // Spawned so a panicking task still counts as finished.
        match tokio::spawn(task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(worker = id, error = %e, "task failed");
                inner.errors.report(e);
            }
            Err(e) => inner.errors.report(TransferError::Pool(e.to_string())),
        }
        inner.finish_one();
    }
}
