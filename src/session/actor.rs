//! Actor hosting: where an actor's loop runs and how it is cancelled.

use crate::error::{Result, VivaError};
use std::future::Future;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// Scheduling model for the agent and user actors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActorMode {
    /// One OS thread per actor, each driving its own current-thread runtime.
    #[default]
    DedicatedThreads,
    /// Tasks on the caller's tokio runtime.
    SharedRuntime,
}

/// Running actor. Dropping it does not stop the actor; use the shutdown watch.
#[derive(Debug)]
pub struct ActorHandle {
    name: &'static str,
    done: oneshot::Receiver<()>,
    thread: Option<JoinHandle<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// Starts `actor` under `mode`. The actor future is dropped as soon as
/// `shutdown` flips to `true`, which releases any guards it holds.
///
/// # Errors
/// `ActorStart` when the thread or runtime cannot be created, or when
/// `SharedRuntime` is requested outside a tokio runtime.
pub fn spawn_actor<F>(
    name: &'static str,
    mode: ActorMode,
    shutdown: watch::Receiver<bool>,
    actor: F,
) -> Result<ActorHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let start_error = |message: String| VivaError::ActorStart {
        actor: name.to_string(),
        message,
    };

    let body = async move {
        tokio::select! {
            () = stop_requested(shutdown) => {
                tracing::debug!(actor = name, "Cancelled by shutdown");
            }
            () = actor => {
                tracing::debug!(actor = name, "Loop finished");
            }
        }
        if done_tx.send(()).is_err() {
            tracing::debug!(actor = name, "Nobody waiting for acknowledgement");
        }
    };

    match mode {
        ActorMode::DedicatedThreads => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| start_error(e.to_string()))?;
            let thread = thread::Builder::new()
                .name(format!("viva-{name}"))
                .spawn(move || runtime.block_on(body))
                .map_err(|e| start_error(e.to_string()))?;
            Ok(ActorHandle {
                name,
                done: done_rx,
                thread: Some(thread),
                task: None,
            })
        }
        ActorMode::SharedRuntime => {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| start_error(e.to_string()))?;
            let task = runtime.spawn(body);
            Ok(ActorHandle {
                name,
                done: done_rx,
                thread: None,
                task: Some(task),
            })
        }
    }
}

/// Resolves once `shutdown` reads `true`. Never resolves if the sender is gone.
async fn stop_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl ActorHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits up to `grace` for the actor to acknowledge shutdown.
    ///
    /// Returns `false` if it did not; the thread is then detached or the task
    /// aborted.
    pub async fn join(mut self, grace: Duration) -> bool {
        let acknowledged = matches!(
            tokio::time::timeout(grace, &mut self.done).await,
            Ok(Ok(()))
        );

        if let Some(task) = self.task.take() {
            if !acknowledged {
                task.abort();
            }
        }
        if let Some(thread) = self.thread.take() {
            if acknowledged {
                // The runtime is torn down right after the ack; give it a moment.
                let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
                while !thread.is_finished() && tokio::time::Instant::now() < deadline {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                if thread.is_finished() && thread.join().is_err() {
                    tracing::error!(actor = self.name, "Actor thread panicked");
                }
            } else {
                tracing::warn!(actor = self.name, "Actor did not stop in time, detaching");
            }
        }
        acknowledged
    }
}
