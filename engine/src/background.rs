//! Running operations off the caller's thread.
//!
//! Driver calls block, so [`spawn`] moves them onto the tokio blocking pool
//! and hands back a [`Pending`] result. Outside a tokio runtime each
//! operation gets a thread of its own.

use crate::{error::Result, Error};
use futures::channel::oneshot;
use std::thread;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Result of an operation that may still be running.
#[derive(Debug)]
pub struct Pending<T> {
    state: PendingState<T>,
}

#[derive(Debug)]
enum PendingState<T> {
    Ready(Result<T>),
    Running(JoinHandle<Result<T>>),
    Thread {
        worker: thread::JoinHandle<()>,
        result: oneshot::Receiver<Result<T>>,
    },
}

impl<T> Pending<T> {
    pub fn is_finished(&self) -> bool {
        match &self.state {
            PendingState::Ready(_) => true,
            PendingState::Running(handle) => handle.is_finished(),
            PendingState::Thread { worker, .. } => worker.is_finished(),
        }
    }

    pub async fn wait(self) -> Result<T> {
        match self.state {
            PendingState::Ready(result) => result,
            PendingState::Running(handle) => handle
                .await
                .map_err(|err| Error::Transport(format!("background operation failed: {}", err)))?,
            PendingState::Thread { result, .. } => result.await.map_err(|_| {
                Error::Transport("background operation ended without a result".to_string())
            })?,
        }
    }

    /// Block the current thread until the result is available. Must not be
    /// called from inside an async task.
    pub fn wait_blocking(self) -> Result<T> {
        futures::executor::block_on(self.wait())
    }
}

/// Run `operation` on the blocking pool, or on a new thread when there is
/// no runtime.
pub fn spawn<T, F>(operation: F) -> Pending<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Pending {
            state: PendingState::Running(handle.spawn_blocking(operation)),
        },
        Err(_) => on_thread(operation),
    }
}

fn on_thread<T, F>(operation: F) -> Pending<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, result) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name("odm-background".to_string())
        .spawn(move || {
            // the receiver may already be gone
            let _ = sender.send(operation());
        });

    match spawned {
        Ok(worker) => Pending {
            state: PendingState::Thread { worker, result },
        },
        Err(err) => {
            tracing::warn!(error = %err, "could not start background thread");
            ready(Err(Error::Transport(format!(
                "could not start background thread: {}",
                err
            ))))
        }
    }
}

/// A result that is already known, such as an argument error found before
/// any work started.
pub fn ready<T>(result: Result<T>) -> Pending<T> {
    Pending {
        state: PendingState::Ready(result),
    }
}
