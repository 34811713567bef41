//! Bounded set of OS threads for blocking collaborator calls.
//!
//! Transcription and other CPU-bound work must not stall an actor's runtime,
//! so it is shipped here and the result comes back through a oneshot. Shutdown
//! closes the queue, lets workers drain what was already submitted, and joins
//! them up to a deadline.

use crate::error::{Result, VivaError};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: RwLock<Option<Sender<Job>>>,
}

impl Shared {
    fn sender(&self) -> Option<Sender<Job>> {
        match self.queue.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn close(&self) {
        let mut guard = match self.queue.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
    }
}

/// Owner of the worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable submission handle given to actors.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Spawns `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("viva-worker-{index}"))
                .spawn(move || worker_loop(rx))
                .map_err(|e| VivaError::ActorStart {
                    actor: format!("worker-{index}"),
                    message: e.to_string(),
                })?;
            workers.push(handle);
        }
        Ok(Self {
            shared: Arc::new(Shared {
                queue: RwLock::new(Some(tx)),
            }),
            workers,
        })
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Closes the queue, waits up to `grace` for workers to drain, and detaches
    /// the rest. Returns the number of detached workers.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        self.shared.close();

        let deadline = Instant::now() + grace;
        let poll_interval = Duration::from_millis(20);
        loop {
            let mut remaining = Vec::new();
            for handle in self.workers.drain(..) {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        tracing::error!("Worker thread panicked outside a job");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.workers = remaining;

            if self.workers.is_empty() {
                return 0;
            }
            if Instant::now() >= deadline {
                let detached = self.workers.len();
                tracing::warn!(detached, "Worker pool shutdown timed out, detaching");
                // Dropping the handles detaches the threads.
                return detached;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl PoolHandle {
    /// Runs `job` on a worker and awaits its result.
    ///
    /// # Errors
    /// `PoolClosed` if the pool has shut down, or `Other` if the job panicked.
    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.shared.sender().ok_or(VivaError::PoolClosed)?;
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job));
            // Receiver gone means the caller was cancelled; the result is dropped.
            if tx.send(outcome).is_err() {
                tracing::debug!("Worker result discarded, caller went away");
            }
        });
        sender.send(wrapped).map_err(|_| VivaError::PoolClosed)?;
        drop(sender);

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic_info)) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic");
                Err(VivaError::Other(format!("Worker job panicked: {msg}")))
            }
            Err(_) => Err(VivaError::PoolClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.sender().is_none()
    }
}

fn worker_loop(rx: Receiver<Job>) {
    // recv() keeps returning queued jobs after the sender is gone, so the
    // queue drains before the worker exits.
    while let Ok(job) = rx.recv() {
        job();
    }
}
