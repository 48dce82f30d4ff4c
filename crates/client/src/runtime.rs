// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background execution context.
//!
//! All network I/O and protocol state transitions run on a single loop
//! thread driving a current-thread tokio runtime. Synchronous user callbacks
//! are handed to the blocking worker pool so they cannot stall the loop.
//! Caller threads submit work through [`RuntimeHandle::schedule`] and block
//! on the returned [`TaskHandle`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::ClientError;

/// What to do with an error escaping a scheduled task.
///
/// Terminating takes precedence over the callback; with neither configured
/// the error is logged and the loop continues.
#[derive(Clone, Default)]
pub struct ErrorPolicy {
    pub terminate_on_error: bool,
    pub on_error: Option<Arc<dyn Fn(ClientError) + Send + Sync>>,
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPolicy")
            .field("terminate_on_error", &self.terminate_on_error)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// The loop thread and its lifecycle. Dropping stops the loop.
pub struct Runtime {
    handle: RuntimeHandle,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Runtime {
    /// Spawn the loop thread. The runtime is ready once this returns.
    pub fn start(policy: ErrorPolicy) -> Result<Runtime, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::Runtime(e.to_string()))?;
        let tokio = runtime.handle().clone();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let (id_tx, id_rx) = std::sync::mpsc::channel();
        let thread = thread::Builder::new()
            .name("warp-client-loop".to_owned())
            .spawn(move || {
                let _ = id_tx.send(thread::current().id());
                // Drives every spawned task until shutdown; dropping the
                // runtime afterwards cancels whatever is still in flight.
                runtime.block_on(token.cancelled());
            })
            .map_err(|e| ClientError::Runtime(e.to_string()))?;
        let loop_thread = id_rx
            .recv()
            .map_err(|_| ClientError::Runtime("loop thread did not start".to_owned()))?;
        Ok(Runtime {
            handle: RuntimeHandle { tokio, shutdown, loop_thread, policy: Arc::new(policy) },
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Cancel outstanding tasks and join the loop thread. Idempotent.
    pub fn stop(&self) {
        self.handle.shutdown.cancel();
        let joined = self.thread.lock().take();
        if let Some(thread) = joined {
            let _ = thread.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cheap, cloneable handle for submitting work to the loop.
#[derive(Clone)]
pub struct RuntimeHandle {
    tokio: tokio::runtime::Handle,
    shutdown: CancellationToken,
    loop_thread: ThreadId,
    policy: Arc<ErrorPolicy>,
}

impl RuntimeHandle {
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn on_loop_thread(&self) -> bool {
        thread::current().id() == self.loop_thread
    }

    /// Submit a future whose result the caller wants back.
    pub fn schedule<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if self.shutdown.is_cancelled() {
            return TaskHandle { rx, loop_thread: self.loop_thread };
        }
        let shutdown = self.shutdown.clone();
        self.tokio.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = future => {
                    let _ = tx.send(result);
                }
            }
        });
        TaskHandle { rx, loop_thread: self.loop_thread }
    }

    /// Fire-and-forget task; an escaping error is routed through the policy.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return;
        }
        let handle = self.clone();
        let shutdown = self.shutdown.clone();
        self.tokio.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = future => {
                    if let Err(err) = result {
                        handle.handle_error(err);
                    }
                }
            }
        });
    }

    /// Run a synchronous closure on the blocking worker pool.
    pub fn spawn_blocking(&self, f: impl FnOnce() + Send + 'static) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.tokio.spawn_blocking(f);
    }

    /// Apply the error policy to a task failure.
    pub(crate) fn handle_error(&self, err: ClientError) {
        error!(err = %err, "task failed");
        if self.policy.terminate_on_error {
            std::process::exit(1);
        }
        if let Some(callback) = self.policy.on_error.clone() {
            self.spawn_blocking(move || callback(err));
        }
    }
}

/// The pending result of a scheduled task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
    loop_thread: ThreadId,
}

impl<T> TaskHandle<T> {
    /// Block the calling thread until the task completes.
    ///
    /// Rejected on the loop thread and inside any async context, where
    /// blocking would stall the scheduler.
    pub fn wait(self) -> Result<T, ClientError> {
        if thread::current().id() == self.loop_thread
            || tokio::runtime::Handle::try_current().is_ok()
        {
            return Err(ClientError::BlockingOnLoop);
        }
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(ClientError::Cancelled),
        }
    }

    /// Await the task from async code.
    pub async fn join(self) -> Result<T, ClientError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Cancelled),
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
