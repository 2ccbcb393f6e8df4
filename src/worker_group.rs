use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use log::{debug, info, trace, warn};

use crate::{
    builder::ThreadSettings,
    task::TaskResult,
    worker::{self, Worker},
    ResourcePool, TaskQueue,
};

/// Performs the actual work of a task on a leased resource.
///
/// Implemented for every `Fn(&mut R, &str) -> String` closure.
pub trait Executor<R>: Send + Sync {
    /// Runs `command` against `resource` and returns its output.
    fn execute(&self, resource: &mut R, command: &str) -> String;
}

impl<R, F> Executor<R> for F
where
    F: Fn(&mut R, &str) -> String + Send + Sync,
{
    fn execute(&self, resource: &mut R, command: &str) -> String {
        self(resource, command)
    }
}

/// What a [`WorkerGroup`] did with the tasks of its queue.
#[derive(Debug, Default)]
pub struct GroupReport {
    /// One result per processed task, in completion order.
    pub results: Vec<TaskResult>,

    /// Ids of tasks that were taken from the queue but dropped because
    /// the resource pool was shut down.
    pub abandoned: Vec<u64>,

    /// The number of tasks left in the queue when the workers stopped.
    pub unclaimed: usize,
}

impl GroupReport {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if every task that entered the queue produced a
    /// result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty() && self.unclaimed == 0
    }
}

#[derive(Default)]
struct GroupShared {
    results: Mutex<Vec<TaskResult>>,
    abandoned: Mutex<Vec<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fixed set of worker threads draining a [`TaskQueue`] through a
/// [`ResourcePool`].
///
/// Each worker repeatedly takes a task, leases a resource, runs the
/// [`Executor`], returns the resource and records a [`TaskResult`]. A
/// worker stops when the queue is closed and drained, or when the pool
/// is shut down; in the latter case the task it was holding is
/// reported as abandoned rather than lost silently.
///
/// Workers never hold the results lock and a resource lease at the
/// same time.
///
/// Use [`WorkerGroupBuilder`](crate::WorkerGroupBuilder) to start one.
pub struct WorkerGroup {
    workers: Vec<Worker>,
    queue: TaskQueue,
    share: Arc<GroupShared>,
}

impl WorkerGroup {
    pub(crate) fn start<R, E>(
        settings: &ThreadSettings,
        queue: TaskQueue,
        pool: ResourcePool<R>,
        executor: Arc<E>,
    ) -> Self
    where
        R: Send + 'static,
        E: Executor<R> + 'static,
    {
        info!(
            "Starting {} workers over a pool of {} resources",
            settings.worker_count,
            pool.capacity()
        );

        let share = Arc::new(GroupShared::default());
        let workers = (0..settings.worker_count)
            .map(|id| {
                let queue = queue.clone();
                let pool = pool.clone();
                let executor = Arc::clone(&executor);
                let share = Arc::clone(&share);
                Worker::spawn(
                    id,
                    settings.name_prefix.as_deref(),
                    settings.thread_factory.as_ref(),
                    move || worker_loop(id, &queue, &pool, executor.as_ref(), &share),
                )
            })
            .collect();

        Self {
            workers,
            queue,
            share,
        }
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if every worker thread has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(Worker::is_finished)
    }

    /// Waits for all worker threads to finish and returns what they
    /// did.
    ///
    /// Workers only stop once the queue is closed for input (or the
    /// pool is shut down), so call [`TaskQueue::close_input`] first.
    ///
    /// # Errors
    ///
    /// An error is returned if a worker panics.
    pub fn join(self) -> thread::Result<GroupReport> {
        worker::join_all(self.workers)?;

        let report = GroupReport {
            results: mem::take(&mut *lock(&self.share.results)),
            abandoned: mem::take(&mut *lock(&self.share.abandoned)),
            unclaimed: self.queue.len(),
        };
        if !report.is_complete() {
            warn!(
                "{} tasks abandoned and {} left in the queue",
                report.abandoned.len(),
                report.unclaimed
            );
        }
        info!("Worker group finished, {} tasks processed", report.processed());
        Ok(report)
    }
}

fn worker_loop<R, E>(
    id: usize,
    queue: &TaskQueue,
    pool: &ResourcePool<R>,
    executor: &E,
    share: &GroupShared,
) where
    E: Executor<R>,
{
    debug!("Worker {}: Starting", id);

    while let Some(task) = queue.dequeue() {
        let mut lease = match pool.acquire() {
            Ok(lease) => lease,
            Err(err) => {
                warn!("Worker {}: Task {} abandoned: {}", id, task.id, err);
                lock(&share.abandoned).push(task.id);
                break;
            }
        };

        trace!("Worker {}: Executing task {}", id, task.id);
        let output = executor.execute(&mut *lease, &task.command);
        drop(lease);

        lock(&share.results).push(TaskResult {
            id: task.id,
            output,
        });
    }

    debug!("Worker {}: Shutting down", id);
}
