use std::{sync::Arc, thread};

use crate::{Executor, ResourcePool, TaskPool, TaskQueue, ThreadFactory, WorkerGroup};

/// Thread settings shared by both builders.
#[derive(Clone)]
pub(crate) struct ThreadSettings {
    pub(crate) worker_count: usize,
    pub(crate) name_prefix: Option<String>,
    pub(crate) thread_factory: Arc<ThreadFactory>,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get_physical(),
            name_prefix: None,
            thread_factory: Arc::new(thread::Builder::new),
        }
    }
}

impl ThreadSettings {
    fn check_arguments(&self) {
        if self.worker_count == 0 {
            panic!("worker_count can not be 0.");
        }
    }
}

/// A builder of the [`WorkerGroup`], which configures the worker
/// threads before they are started against a queue and a pool.
///
/// # Examples
///
/// ```
/// use workpool::{ResourcePool, Task, TaskQueue, WorkerGroupBuilder};
///
/// let pool = ResourcePool::new("db://local", 2, |conf| conf.to_string());
/// let queue = TaskQueue::new();
/// let group = WorkerGroupBuilder::default()
///     .worker_count(3)
///     .thread_name("query-worker")
///     .spawn(&queue, &pool, |conn: &mut String, command: &str| {
///         format!("{} on {}", command, conn)
///     });
///
/// queue.enqueue(Task::new(7, "select 1")).unwrap();
/// queue.close_input();
///
/// let report = group.join().unwrap();
/// assert_eq!("select 1 on db://local", report.results[0].output);
/// ```
#[derive(Default)]
pub struct WorkerGroupBuilder {
    settings: ThreadSettings,
}

impl WorkerGroupBuilder {
    /// Creates the base configuration for a new worker group.
    ///
    /// The default number of workers is the number of physical cores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.settings.worker_count = count;
        self
    }

    /// Names worker threads `{prefix}-{index}`.
    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.settings.name_prefix = Some(prefix.into());
        self
    }

    /// Sets the factory function that is used to create a new custom
    /// thread.
    #[must_use]
    pub fn thread_factory_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> thread::Builder + Send + Sync + 'static,
    {
        self.settings.thread_factory = Arc::new(f);
        self
    }

    /// Starts the workers. Each one takes tasks from `queue`, runs them
    /// with `executor` on a resource leased from `pool`, and records
    /// the results.
    ///
    /// # Panics
    ///
    /// Panics if the builder has invalid arguments.
    pub fn spawn<R, E>(
        self,
        queue: &TaskQueue,
        pool: &ResourcePool<R>,
        executor: E,
    ) -> WorkerGroup
    where
        R: Send + 'static,
        E: Executor<R> + 'static,
    {
        self.settings.check_arguments();
        WorkerGroup::start(&self.settings, queue.clone(), pool.clone(), Arc::new(executor))
    }
}

/// A builder of the [`TaskPool`].
///
/// # Examples
///
/// ```
/// use workpool::TaskPoolBuilder;
///
/// let pool = TaskPoolBuilder::default()
///     .worker_count(4)
///     .thread_name("job")
///     .thread_factory_fn(|| std::thread::Builder::new().stack_size(1024 * 64))
///     .build();
///
/// pool.execute(|| println!("Hello World")).unwrap();
/// pool.wait_until_done();
/// ```
#[derive(Default)]
pub struct TaskPoolBuilder {
    settings: ThreadSettings,
}

impl TaskPoolBuilder {
    /// Creates the base configuration for a new task pool.
    ///
    /// The default number of workers is the number of physical cores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.settings.worker_count = count;
        self
    }

    /// Names worker threads `{prefix}-{index}`.
    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.settings.name_prefix = Some(prefix.into());
        self
    }

    /// Sets the factory function that is used to create a new custom
    /// thread.
    #[must_use]
    pub fn thread_factory_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> thread::Builder + Send + Sync + 'static,
    {
        self.settings.thread_factory = Arc::new(f);
        self
    }

    /// Creates a task pool and starts its workers.
    ///
    /// # Panics
    ///
    /// Panics if the builder has invalid arguments.
    pub fn build(self) -> TaskPool {
        self.settings.check_arguments();
        TaskPool::from_settings(&self.settings)
    }
}
