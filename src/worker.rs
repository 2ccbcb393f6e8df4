use std::thread::{self, JoinHandle};

/// A function that used to create a custom thread.
pub type ThreadFactory = dyn Fn() -> thread::Builder + Send + Sync + 'static;

/// A worker holds the handle of a thread running a worker loop.
pub(crate) struct Worker {
    pub(crate) handle: JoinHandle<()>,
}

impl Worker {
    /// Spawns a thread from `thread_factory` running `body`. The thread
    /// is named `{prefix}-{id}` if a prefix is given.
    ///
    /// # Panics
    ///
    /// Panics if the thread could not be spawned.
    pub(crate) fn spawn<F>(
        id: usize,
        name_prefix: Option<&str>,
        thread_factory: &ThreadFactory,
        body: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = thread_factory();
        if let Some(prefix) = name_prefix {
            builder = builder.name(format!("{}-{}", prefix, id));
        }
        Worker {
            handle: builder.spawn(body).expect("failed to spawn a thread."),
        }
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Joins the thread unless it is the calling thread.
    #[inline]
    pub(crate) fn join(self) -> thread::Result<()> {
        if self.handle.thread().id() != thread::current().id() {
            self.handle.join()?;
        }
        Ok(())
    }
}

/// Joins every worker, returning the first panic after all threads
/// have been joined.
pub(crate) fn join_all(workers: Vec<Worker>) -> thread::Result<()> {
    let mut outcome = Ok(());
    for worker in workers {
        if let Err(err) = worker.join() {
            if outcome.is_ok() {
                outcome = Err(err);
            }
        }
    }
    outcome
}
