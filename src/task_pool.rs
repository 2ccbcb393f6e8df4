use std::{
    mem,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::{
    builder::ThreadSettings,
    task::Job,
    worker::{self, Worker},
    TaskPoolBuilder,
};

/// An error returned from [`TaskPool::execute`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskPoolError {
    /// The task could not be executed because the pool is stopped.
    #[error("task pool is stopped")]
    Stopped,
}

/// Counters of a [`TaskPool`] after it was joined.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolReport {
    /// Tasks that ran to completion.
    pub completed: usize,

    /// Tasks that panicked.
    pub panicked: usize,

    /// Tasks that were accepted but never run because the pool was
    /// stopped first.
    pub discarded: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct TaskPoolSharedData {
    sender: Mutex<Option<Sender<Job>>>,
    stopped: AtomicBool,
    in_flight: AtomicUsize,
    pending: Mutex<usize>,
    all_done: Condvar,
    completed: AtomicUsize,
    panicked: AtomicUsize,
    discarded: AtomicUsize,
}

impl TaskPoolSharedData {
    fn accept(&self) {
        *lock(&self.pending) += 1;
    }

    fn finish(&self) {
        let mut pending = lock(&self.pending);
        *pending -= 1;
        if *pending == 0 {
            self.all_done.notify_all();
        }
    }

    fn discard(&self, job: Job) {
        drop(job);
        self.discarded.fetch_add(1, Ordering::SeqCst);
        self.finish();
    }
}

/// A fixed set of worker threads executing arbitrary closures.
///
/// Submitted closures are queued in FIFO order and picked up by the
/// next idle worker. A closure that panics is logged and counted; the
/// worker carries on with the next one.
///
/// # Completion
///
/// Every accepted closure is counted as *pending* before it is queued
/// and stops being pending once it has run (or been discarded).
/// [`wait_until_done`] blocks until nothing is pending, so it can not
/// return between [`execute`] and the closure starting.
///
/// # Shutdown
///
/// [`shutdown`] stops the pool: new closures are refused and the
/// closures still queued are discarded without running. The number of
/// discarded closures is logged and reported by [`join`]. Dropping the
/// pool shuts it down and joins the workers.
///
/// [`wait_until_done`]: TaskPool::wait_until_done
/// [`execute`]: TaskPool::execute
/// [`shutdown`]: TaskPool::shutdown
/// [`join`]: TaskPool::join
///
/// # Examples
///
/// ```
/// use workpool::TaskPool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = TaskPool::new(4);
/// let sum = Arc::new(AtomicUsize::new(0));
/// for _ in 0..10 {
///     let sum = sum.clone();
///     pool.execute(move || {
///         sum.fetch_add(1, Ordering::SeqCst);
///     })
///     .unwrap();
/// }
///
/// pool.wait_until_done();
/// assert_eq!(10, sum.load(Ordering::SeqCst));
/// ```
pub struct TaskPool {
    receiver: Receiver<Job>,
    share: Arc<TaskPoolSharedData>,
    workers: Mutex<Vec<Worker>>,
}

impl TaskPool {
    /// Creates a pool with `worker_count` threads and the default
    /// settings.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is 0.
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        TaskPoolBuilder::new().worker_count(worker_count).build()
    }

    /// Builds a task pool from a configuration.
    ///
    /// This assumes the settings are valid.
    pub(crate) fn from_settings(settings: &ThreadSettings) -> Self {
        let (sender, receiver) = unbounded();
        let share = Arc::new(TaskPoolSharedData {
            sender: Mutex::new(Some(sender)),
            stopped: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            pending: Mutex::new(0),
            all_done: Condvar::new(),
            completed: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        });

        info!("Creating task pool with {} workers", settings.worker_count);
        let workers = (0..settings.worker_count)
            .map(|id| {
                let receiver = receiver.clone();
                let share = share.clone();
                Worker::spawn(
                    id,
                    settings.name_prefix.as_deref(),
                    settings.thread_factory.as_ref(),
                    move || worker_loop(id, &receiver, &share),
                )
            })
            .collect();

        Self {
            receiver,
            share,
            workers: Mutex::new(workers),
        }
    }

    /// Queues `task_fn` to be run by a worker.
    ///
    /// # Errors
    ///
    /// Returns [`TaskPoolError::Stopped`] if the pool was shut down.
    pub fn execute<F>(&self, task_fn: F) -> Result<(), TaskPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_stopped() {
            return Err(TaskPoolError::Stopped);
        }

        self.share.accept();
        let sent = match lock(&self.share.sender).as_ref() {
            Some(sender) => sender.send(Job::new(Box::new(task_fn))).is_ok(),
            None => false,
        };
        if !sent {
            self.share.finish();
            return Err(TaskPoolError::Stopped);
        }
        Ok(())
    }

    /// Blocks until every accepted task has run or been discarded.
    ///
    /// Calling this from inside a task of the same pool never returns,
    /// since the calling task is itself pending.
    pub fn wait_until_done(&self) {
        let pending = lock(&self.share.pending);
        drop(
            self.share
                .all_done
                .wait_while(pending, |pending| *pending > 0)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    /// Stops the pool and wakes every worker. Tasks that have not
    /// started yet are discarded. Calling it more than once has no
    /// effect.
    pub fn shutdown(&self) {
        if self.share.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.share.sender).take();

        let mut discarded = 0;
        for job in self.receiver.try_iter() {
            self.share.discard(job);
            discarded += 1;
        }
        if discarded > 0 {
            warn!("Task pool stopped, {} queued tasks discarded", discarded);
        } else {
            debug!("Task pool stopped");
        }
    }

    /// Stops the pool and waits for all worker threads to finish.
    ///
    /// If this is called in a worker thread, then that worker thread
    /// will not be joined.
    ///
    /// # Errors
    ///
    /// An error is returned if a worker thread panics.
    pub fn join(&self) -> thread::Result<PoolReport> {
        self.shutdown();
        let workers = mem::take(&mut *lock(&self.workers));
        worker::join_all(workers)?;
        Ok(PoolReport {
            completed: self.completed(),
            panicked: self.panicked(),
            discarded: self.discarded(),
        })
    }

    /// Returns `true` if the pool was shut down.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.share.stopped.load(Ordering::SeqCst)
    }

    /// The number of tasks running right now.
    ///
    /// This reads zero for a task that was accepted but not yet picked
    /// up by a worker; use [`pending`](Self::pending) to learn whether
    /// work is outstanding.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.share.in_flight.load(Ordering::SeqCst)
    }

    /// The number of tasks accepted and not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        *lock(&self.share.pending)
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.share.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn panicked(&self) -> usize {
        self.share.panicked.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn discarded(&self) -> usize {
        self.share.discarded.load(Ordering::SeqCst)
    }

    /// The number of worker threads not yet joined.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if self.join().is_err() {
            error!("A task pool worker panicked");
        }
    }
}

fn worker_loop(id: usize, receiver: &Receiver<Job>, share: &TaskPoolSharedData) {
    debug!("Worker {}: Starting", id);

    while let Ok(job) = receiver.recv() {
        if share.stopped.load(Ordering::SeqCst) {
            share.discard(job);
            continue;
        }

        share.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = job.run();
        share.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                trace!("Worker {}: Task completed", id);
                share.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(msg) => {
                error!("Worker {}: Task panicked: {}", id, msg);
                share.panicked.fetch_add(1, Ordering::SeqCst);
            }
        }
        share.finish();
    }

    debug!("Worker {}: Shutting down", id);
}

#[cfg(test)]
mod tests {
    use super::{PoolReport, TaskPool, TaskPoolError};
    use crate::TaskPoolBuilder;
    use crossbeam_channel::bounded;
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_execute_in_multiple_threads() {
        let pool = Arc::new(TaskPool::new(4));
        let sum = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let pool = pool.clone();
            let sum = sum.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10 {
                    let sum = sum.clone();
                    pool.execute(move || {
                        sum.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        pool.wait_until_done();
        assert_eq!(100, sum.load(Ordering::SeqCst));
        assert_eq!(0, pool.pending());
        assert_eq!(0, pool.in_flight());

        let report = pool.join().unwrap();
        assert_eq!(
            PoolReport {
                completed: 100,
                panicked: 0,
                discarded: 0,
            },
            report
        );
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = TaskPool::new(1);
        let ran = Arc::new(AtomicBool::new(false));

        pool.execute(|| panic!("task failure")).unwrap();
        {
            let ran = ran.clone();
            pool.execute(move || ran.store(true, Ordering::SeqCst))
                .unwrap();
        }
        pool.wait_until_done();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(1, pool.panicked());
        assert_eq!(1, pool.completed());
        assert_eq!(1, pool.worker_count());
    }

    #[test]
    fn test_wait_until_done_never_returns_early() {
        let pool = TaskPool::new(2);
        for _ in 0..200 {
            let done = Arc::new(AtomicBool::new(false));
            {
                let done = done.clone();
                pool.execute(move || done.store(true, Ordering::SeqCst))
                    .unwrap();
            }
            pool.wait_until_done();
            assert!(done.load(Ordering::SeqCst));
        }
    }

    #[test]
    fn test_queued_task_is_pending_but_not_in_flight() {
        let pool = Arc::new(TaskPool::new(1));
        let (started_tx, started_rx) = bounded(0);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let ran = Arc::new(AtomicBool::new(false));

        pool.execute(move || {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
        })
        .unwrap();
        started_rx.recv().unwrap();
        {
            let ran = ran.clone();
            pool.execute(move || ran.store(true, Ordering::SeqCst))
                .unwrap();
        }

        // The second task is queued behind the first one: an in-flight
        // count alone would claim only one task of work is left.
        assert_eq!(1, pool.in_flight());
        assert_eq!(2, pool.pending());

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.wait_until_done())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        gate_tx.send(()).unwrap();
        waiter.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(0, pool.pending());
    }

    #[test]
    fn test_shutdown_discards_queued_tasks() {
        let pool = TaskPool::new(1);
        let (started_tx, started_rx) = bounded(0);
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let ran = Arc::new(AtomicUsize::new(0));

        pool.execute(move || {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
        })
        .unwrap();
        started_rx.recv().unwrap();

        for _ in 0..5 {
            let ran = ran.clone();
            pool.execute(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(Err(TaskPoolError::Stopped), pool.execute(|| ()));
        gate_tx.send(()).unwrap();

        let report = pool.join().unwrap();
        assert_eq!(0, ran.load(Ordering::SeqCst));
        assert_eq!(1, report.completed);
        assert_eq!(5, report.discarded);
        pool.wait_until_done();
    }

    #[test]
    fn test_shutdown_in_multiple_threads() {
        let pool = Arc::new(TaskPool::new(3));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                pool.shutdown();
                assert!(pool.is_stopped());
                assert_eq!(Err(TaskPoolError::Stopped), pool.execute(|| ()));
                pool.wait_until_done();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(pool.join().is_ok());
        assert!(pool.join().is_ok());
        assert_eq!(0, pool.worker_count());
    }

    #[test]
    fn test_thread_factory() {
        let pool = TaskPoolBuilder::new()
            .worker_count(2)
            .thread_factory_fn(|| thread::Builder::new().name("test".into()))
            .build();
        let (tx, rx) = bounded(2);
        for _ in 0..2 {
            let tx = tx.clone();
            pool.execute(move || {
                tx.send(thread::current().name().map(str::to_string))
                    .unwrap();
            })
            .unwrap();
        }
        for _ in 0..2 {
            assert_eq!(Some("test".to_string()), rx.recv().unwrap());
        }
    }
}
