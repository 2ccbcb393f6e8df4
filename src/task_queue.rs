use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use thiserror::Error;

use crate::task::Task;

/// An error returned from [`TaskQueue::enqueue`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed for input; the rejected task is handed
    /// back.
    #[error("task queue is closed for input (task {})", .0.id)]
    Closed(Task),
}

/// An unbounded FIFO queue of [`Task`]s with a "no more input" signal.
///
/// The queue is a multi-producer multi-consumer channel. Closing the
/// input drops the only sender, so consumers first drain whatever is
/// left and then observe the end of the queue.
///
/// Cloning a `TaskQueue` yields another handle to the same queue.
///
/// # Examples
///
/// ```
/// use workpool::{Task, TaskQueue};
///
/// let queue = TaskQueue::new();
/// queue.enqueue(Task::new(1, "select 1")).unwrap();
/// queue.close_input();
///
/// assert_eq!(Some(1), queue.dequeue().map(|task| task.id));
/// assert_eq!(None, queue.dequeue());
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    sender: Arc<Mutex<Option<Sender<Task>>>>,
    receiver: Receiver<Task>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    /// Appends a task to the tail of the queue and wakes one consumer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if [`close_input`] was called.
    ///
    /// [`close_input`]: TaskQueue::close_input
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        match self.lock_sender().as_ref() {
            // The receiver lives in `self`, so the send never fails.
            Some(sender) => sender.send(task).map_err(|err| QueueError::Closed(err.0)),
            None => Err(QueueError::Closed(task)),
        }
    }

    /// Marks that no more tasks will arrive and wakes every consumer.
    /// Tasks already queued are still handed out by [`dequeue`].
    ///
    /// Calling it more than once has no effect.
    ///
    /// [`dequeue`]: TaskQueue::dequeue
    pub fn close_input(&self) {
        if self.lock_sender().take().is_some() {
            debug!("Task queue closed with {} tasks pending", self.len());
        }
    }

    /// Takes the next task, blocking while the queue is empty and still
    /// open.
    ///
    /// Returns `None` once the queue is both empty and closed.
    pub fn dequeue(&self) -> Option<Task> {
        self.receiver.recv().ok()
    }

    /// Returns `true` if [`close_input`](Self::close_input) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_sender().is_none()
    }

    /// The number of tasks waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn lock_sender(&self) -> MutexGuard<'_, Option<Sender<Task>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{QueueError, TaskQueue};
    use crate::Task;
    use std::{thread, time::Duration};

    #[test]
    fn test_single_consumer_fifo() {
        let queue = TaskQueue::new();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for id in 0..500 {
                    queue.enqueue(Task::new(id, format!("cmd {}", id))).unwrap();
                }
                queue.close_input();
            })
        };

        let mut seen = Vec::new();
        while let Some(task) = queue.dequeue() {
            assert_eq!(format!("cmd {}", task.id), task.command);
            seen.push(task.id);
        }
        producer.join().unwrap();

        assert_eq!((0..500).collect::<Vec<_>>(), seen);
    }

    #[test]
    fn test_close_drains_pending_tasks() {
        let queue = TaskQueue::new();
        for id in 0..3 {
            queue.enqueue(Task::new(id, "q")).unwrap();
        }
        queue.close_input();
        queue.close_input();
        assert!(queue.is_closed());
        assert_eq!(3, queue.len());

        assert_eq!(Some(0), queue.dequeue().map(|task| task.id));
        assert_eq!(Some(1), queue.dequeue().map(|task| task.id));
        assert_eq!(Some(2), queue.dequeue().map(|task| task.id));
        assert_eq!(None, queue.dequeue());
        assert_eq!(None, queue.dequeue());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_after_close() {
        let queue = TaskQueue::new();
        queue.close_input();
        assert_eq!(
            Err(QueueError::Closed(Task::new(9, "late"))),
            queue.enqueue(Task::new(9, "late"))
        );
    }

    #[test]
    fn test_close_wakes_blocked_consumers() {
        let queue = TaskQueue::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(thread::spawn(move || queue.dequeue()));
        }
        thread::sleep(Duration::from_millis(50));
        assert!(handles.iter().all(|handle| !handle.is_finished()));

        queue.close_input();
        for handle in handles {
            assert_eq!(None, handle.join().unwrap());
        }
    }
}
