//! Bounded-parallelism task runner.
//!
//! [`ConcurrentExecutor`] runs at most `limit` tasks at once. Extra tasks
//! queue in submission order and start the moment a running task settles,
//! whether it succeeded or failed. A failing task only fails its own caller.
//!
//! ```
//! use fetchbox::{ConcurrencyLimit, ConcurrentExecutor, ExecuteItem};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let executor = ConcurrentExecutor::with_default_handler(
//!     |id: u32| async move { Ok::<_, std::convert::Infallible>(id * 2) },
//!     ConcurrencyLimit::new(2).unwrap(),
//! );
//!
//! let results = executor.execute_all((1..=4).map(ExecuteItem::Value)).await;
//! let doubled = results.into_iter().map(Result::unwrap).collect::<Vec<_>>();
//! assert_eq!(doubled, vec![2, 4, 6, 8]);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::{BoxFuture, join_all};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::ConcurrencyLimit;

/// Shared task function: takes one value, produces one result.
pub type TaskFn<V, T, E> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Errors returned by [`ConcurrentExecutor::execute`].
#[derive(Debug, Error, PartialEq)]
pub enum ExecutorError<E> {
    /// A bare value was submitted but the executor has no default handler.
    #[error("no default handler to run a bare value")]
    NoDefaultHandler,

    /// The executor's limiter was closed.
    #[error("executor closed")]
    Closed,

    /// The task itself failed.
    #[error("task failed: {0}")]
    Task(E),
}

/// One unit of work.
pub enum ExecuteItem<V, T, E> {
    /// Run with the executor's default handler.
    Value(V),
    /// Run with an explicit handler.
    Task {
        /// Handler for this item.
        handler: TaskFn<V, T, E>,
        /// Argument passed to `handler`.
        value: V,
    },
}

impl<V, T, E> ExecuteItem<V, T, E>
where
    V: 'static,
    T: 'static,
    E: 'static,
{
    /// Wraps an async function and its argument.
    pub fn task<F, Fut>(handler: F, value: V) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        ExecuteItem::Task {
            handler: boxed(handler),
            value,
        }
    }
}

impl<V: fmt::Debug, T, E> fmt::Debug for ExecuteItem<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecuteItem::Value(value) => f.debug_tuple("Value").field(value).finish(),
            ExecuteItem::Task { value, .. } => {
                f.debug_struct("Task").field("value", value).finish_non_exhaustive()
            }
        }
    }
}

fn boxed<V, T, E, F, Fut>(handler: F) -> TaskFn<V, T, E>
where
    V: 'static,
    T: 'static,
    E: 'static,
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(handler(value)))
}

/// Runs async tasks with bounded parallelism.
///
/// Clones share the same limit and counters.
pub struct ConcurrentExecutor<V, T, E> {
    default_handler: Option<TaskFn<V, T, E>>,
    limit: ConcurrencyLimit,
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
}

impl<V, T, E> Clone for ConcurrentExecutor<V, T, E> {
    fn clone(&self) -> Self {
        Self {
            default_handler: self.default_handler.clone(),
            limit: self.limit,
            semaphore: self.semaphore.clone(),
            queued: self.queued.clone(),
        }
    }
}

impl<V, T, E> fmt::Debug for ConcurrentExecutor<V, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentExecutor")
            .field("limit", &self.limit.get())
            .field("running", &self.running())
            .field("queued", &self.queued())
            .field("default_handler", &self.default_handler.is_some())
            .finish()
    }
}

impl<V, T, E> Default for ConcurrentExecutor<V, T, E> {
    fn default() -> Self {
        Self::new(ConcurrencyLimit::default())
    }
}

/// Keeps the queued count right when a waiting task is dropped.
struct QueuedGuard<'a>(&'a AtomicUsize);

impl<'a> QueuedGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<V, T, E> ConcurrentExecutor<V, T, E> {
    /// Executor without a default handler. Only [`ExecuteItem::Task`] items run.
    pub fn new(limit: ConcurrencyLimit) -> Self {
        Self {
            default_handler: None,
            limit,
            semaphore: Arc::new(Semaphore::new(usize::from(limit.get()))),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Executor that runs bare values with `handler`.
    pub fn with_default_handler<F, Fut>(handler: F, limit: ConcurrencyLimit) -> Self
    where
        V: 'static,
        T: 'static,
        E: 'static,
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            default_handler: Some(boxed(handler)),
            ..Self::new(limit)
        }
    }

    /// Maximum number of tasks running at once.
    pub fn limit(&self) -> ConcurrencyLimit {
        self.limit
    }

    /// Tasks currently running.
    pub fn running(&self) -> usize {
        usize::from(self.limit.get()) - self.semaphore.available_permits()
    }

    /// Tasks waiting for a free slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Runs one item once a slot is free and returns its result.
    pub async fn execute(&self, item: ExecuteItem<V, T, E>) -> Result<T, ExecutorError<E>> {
        let (handler, value) = match item {
            ExecuteItem::Value(value) => match &self.default_handler {
                Some(handler) => (handler.clone(), value),
                None => return Err(ExecutorError::NoDefaultHandler),
            },
            ExecuteItem::Task { handler, value } => (handler, value),
        };

        let permit = {
            let _queued = QueuedGuard::enter(&self.queued);
            self.semaphore
                .acquire()
                .await
                .map_err(|_| ExecutorError::Closed)?
        };
        trace!(running = self.running(), queued = self.queued(), "Task started");

        let result = handler(value).await.map_err(ExecutorError::Task);
        drop(permit);
        result
    }

    /// Runs every item, at most `limit` at a time, and returns their results
    /// in submission order.
    pub async fn execute_all<I>(&self, items: I) -> Vec<Result<T, ExecutorError<E>>>
    where
        I: IntoIterator<Item = ExecuteItem<V, T, E>>,
    {
        join_all(items.into_iter().map(|item| self.execute(item))).await
    }
}
