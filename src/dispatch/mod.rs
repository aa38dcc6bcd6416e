//! Dispatch onto a designated serial context.
//!
//! Callbacks with a main affinity are handed to a [`Dispatcher`]. The crate
//! ships two:
//!
//! - [`MainContext`]: a single serial execution context, driven either by a
//!   thread the caller owns ([`MainLoop::run`]) or by a spawned thread
//!   ([`MainContext::spawn`])
//! - [`Immediate`]: runs every job on the calling thread

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned by a dispatcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The context is no longer accepting work.
    #[error("dispatch context is closed")]
    Closed,

    /// The job was dropped or panicked before completing.
    #[error("dispatched job did not complete")]
    Aborted,
}

/// Runs jobs on a designated execution context.
pub trait Dispatcher: Send + Sync {
    /// Queue the job and return immediately.
    fn dispatch_async(&self, job: Job) -> Result<(), DispatchError>;

    /// Run the job on the context and block until it has completed.
    fn dispatch_sync(&self, job: Job) -> Result<(), DispatchError>;
}

enum Message {
    Run(Job),
    Shutdown,
}

/// Handle to a serial execution context.
///
/// Cheap to clone; every clone feeds the same [`MainLoop`].
#[derive(Clone)]
pub struct MainContext {
    tx: mpsc::UnboundedSender<Message>,
    owner: Owner,
}

/// The receiving side of a [`MainContext`]; runs jobs one at a time.
pub struct MainLoop {
    rx: mpsc::UnboundedReceiver<Message>,
    owner: Owner,
}

/// The thread currently driving a loop, shared by the context and the loop.
type Owner = Arc<Mutex<Option<ThreadId>>>;

impl MainContext {
    /// Create a context and the loop that drives it.
    ///
    /// The calling thread is the context's thread until another thread
    /// drives the loop with [`MainLoop::run`] or [`MainLoop::run_pending`].
    pub fn new() -> (MainContext, MainLoop) {
        Self::with_owner(Some(thread::current().id()))
    }

    fn with_owner(owner: Option<ThreadId>) -> (MainContext, MainLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        let owner = Arc::new(Mutex::new(owner));
        (
            MainContext {
                tx,
                owner: Arc::clone(&owner),
            },
            MainLoop { rx, owner },
        )
    }

    /// Create a context driven by a dedicated, named thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<(MainContext, JoinHandle<()>)> {
        let (context, main_loop) = Self::with_owner(None);
        let join = thread::Builder::new()
            .name(name.into())
            .spawn(move || main_loop.run())?;
        Ok((context, join))
    }

    /// Whether the caller is running on the context's thread.
    pub fn is_current(&self) -> bool {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }

    /// Ask the loop to stop after the jobs queued before this call.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    /// Whether the loop has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Dispatcher for MainContext {
    fn dispatch_async(&self, job: Job) -> Result<(), DispatchError> {
        self.tx
            .send(Message::Run(job))
            .map_err(|_| DispatchError::Closed)
    }

    fn dispatch_sync(&self, job: Job) -> Result<(), DispatchError> {
        // Queueing behind ourselves would never return.
        if self.is_current() {
            job();
            return Ok(());
        }

        let (done_tx, done_rx) = oneshot::channel();
        let wrapped: Job = Box::new(move || {
            job();
            let _ = done_tx.send(());
        });
        self.tx
            .send(Message::Run(wrapped))
            .map_err(|_| DispatchError::Closed)?;
        done_rx.blocking_recv().map_err(|_| DispatchError::Aborted)
    }
}

impl MainLoop {
    /// Run jobs until shutdown is requested or every [`MainContext`] is gone.
    ///
    /// Blocks the calling thread. Must not be called from inside an async
    /// runtime.
    pub fn run(mut self) {
        self.claim();
        debug!("main loop started");
        while let Some(message) = self.rx.blocking_recv() {
            match message {
                Message::Run(job) => run_job(job),
                Message::Shutdown => break,
            }
        }
        self.rx.close();
        debug!("main loop stopped");
    }

    /// Run every job already queued, without waiting for more.
    ///
    /// Returns the number of jobs run. Useful when the owning thread has its
    /// own event loop and drains the context between iterations.
    pub fn run_pending(&mut self) -> usize {
        self.claim();
        let mut count = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Run(job) => {
                    run_job(job);
                    count += 1;
                }
                Message::Shutdown => {
                    self.rx.close();
                    break;
                }
            }
        }
        count
    }

    fn claim(&self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
    }
}

fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("job panicked on the main context");
    }
}

/// A dispatcher that runs every job on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Dispatcher for Immediate {
    fn dispatch_async(&self, job: Job) -> Result<(), DispatchError> {
        job();
        Ok(())
    }

    fn dispatch_sync(&self, job: Job) -> Result<(), DispatchError> {
        job();
        Ok(())
    }
}
