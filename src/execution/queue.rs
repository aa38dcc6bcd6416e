//! Task queue runtime.
//!
//! The `TaskQueue` runs submitted tasks with:
//! - Dependency tracking: a task starts once every dependency has finished
//! - Concurrency limiting via semaphore
//! - Bodies executed synchronously on tokio's blocking pool
//! - Cooperative cancellation through [`TaskHandle::cancel`]

use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info_span};

use crate::config::QueueConfig;
use crate::core::callback::TaskOptions;
use crate::core::handle::TaskHandle;
use crate::core::operation::{Operation, TaskError};
use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::dispatch::{Dispatcher, MainContext};
use crate::events::{Event, EventBus};

/// Errors returned when building a queue or submitting to it.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was created outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A task listed itself as a dependency.
    #[error("task {0} depends on itself")]
    SelfDependency(TaskId),

    /// The configuration cannot be used.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// The main context thread could not be spawned.
    #[error("failed to spawn main context: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runtime for tasks: queuing, dependency ordering, and cancellation.
pub struct TaskQueue {
    runtime: Handle,
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
    task_defaults: TaskOptions,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    event_bus: Option<Arc<EventBus>>,
    handles: Mutex<Vec<TaskHandle>>,
}

impl TaskQueue {
    /// Create a queue on the current tokio runtime.
    ///
    /// When the config names a main context, a thread with that name is
    /// spawned and becomes the queue's dispatcher. It stops once the queue
    /// and every task holding it are dropped.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let dispatcher = match &config.main_context {
            Some(name) => {
                let (context, _thread) = MainContext::spawn(name.as_str())?;
                Some(Arc::new(context) as Arc<dyn Dispatcher>)
            }
            None => None,
        };

        Ok(Self {
            runtime,
            max_concurrency: config.max_concurrency,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            task_defaults: config.task_defaults,
            dispatcher,
            event_bus: None,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Use `dispatcher` for tasks that have none of their own.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Emit lifecycle events to `event_bus`.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Get the maximum concurrency limit.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Get the number of available permits (slots for concurrent execution).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of submitted tasks that have not finished yet.
    pub fn operation_count(&self) -> usize {
        self.live_handles().len()
    }

    /// Create a task configured with the queue's defaults and dispatcher.
    pub fn task<R, O>(&self, name: impl Into<String>, operation: O) -> Task<R>
    where
        R: Send + 'static,
        O: Operation<Output = R>,
    {
        let task = Task::new(name, operation).with_options(&self.task_defaults);
        match &self.dispatcher {
            Some(dispatcher) => task.with_dispatcher(Arc::clone(dispatcher)),
            None => task,
        }
    }

    /// Create a closure-backed task configured like [`task`](Self::task).
    pub fn task_fn<R, F>(&self, name: impl Into<String>, body: F) -> Task<R>
    where
        R: Send + 'static,
        F: FnMut() -> Result<R, TaskError> + Send + 'static,
    {
        self.task(name, crate::core::operation::from_fn(body))
    }

    /// Enqueue a task.
    ///
    /// Returns immediately. The task waits for its dependencies, then for a
    /// concurrency permit, then runs on a blocking worker thread.
    pub fn submit<R: Send + 'static>(&self, task: Task<R>) -> Result<TaskHandle, QueueError> {
        let handle = task.handle();
        if task.dependencies().iter().any(|d| d.id() == handle.id()) {
            return Err(QueueError::SelfDependency(handle.id()));
        }

        let task = match (&self.dispatcher, task.has_dispatcher()) {
            (Some(dispatcher), false) => task.with_dispatcher(Arc::clone(dispatcher)),
            _ => task,
        };

        let dependencies = task.dependencies().to_vec();
        let semaphore = Arc::clone(&self.semaphore);
        let event_bus = self.event_bus.clone();
        let id = handle.id();
        let name = handle.name().to_owned();

        debug!(task = %name, id = %id, dependencies = dependencies.len(), "task queued");

        let span = info_span!("queue_dispatch", task = %name, id = %id);
        self.runtime.spawn(
            async move {
                if let Some(bus) = &event_bus {
                    bus.emit(Event::task_queued(id, &name, dependencies.len()))
                        .await;
                }

                for dependency in &dependencies {
                    dependency.wait_finished().await;
                }

                // Dropping the task publishes it as finished and failed.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    error!("semaphore closed, dropping task");
                    return;
                };

                if let Some(bus) = &event_bus {
                    bus.emit(Event::task_started(id, &name)).await;
                }

                let start = Instant::now();
                let span = tracing::Span::current();
                let joined =
                    tokio::task::spawn_blocking(move || span.in_scope(|| task.run())).await;

                let event = match joined {
                    Ok(outcome) => {
                        debug!(outcome = outcome.as_str(), "task finished");
                        Event::from_outcome(id, &name, outcome, start.elapsed())
                    }
                    Err(err) => {
                        error!(error = %err, "task body panicked");
                        let error = TaskError::Panicked(err.to_string()).to_string();
                        Event::task_failed(id, &name, error, start.elapsed())
                    }
                };
                if let Some(bus) = &event_bus {
                    bus.emit(event).await;
                }
            }
            .instrument(span),
        );

        self.track(handle.clone());
        Ok(handle)
    }

    /// Cancel every task that has not finished.
    pub fn cancel_all(&self) {
        for handle in self.live_handles() {
            handle.cancel();
        }
    }

    /// Wait until every task submitted so far has finished.
    pub async fn wait_until_all_finished(&self) {
        for handle in self.live_handles() {
            handle.wait_finished().await;
        }
    }

    fn track(&self, handle: TaskHandle) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn live_handles(&self) -> Vec<TaskHandle> {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.iter().filter(|h| !h.is_finished()).cloned().collect()
    }
}
