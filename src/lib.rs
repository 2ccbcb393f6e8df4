//! # Work Pool
//!
//! Building blocks for dispatching a stream of work to a fixed set of
//! threads while bounding access to a scarce resource.
//!
//! - [`ResourcePool`]: a fixed number of reusable resources (such as
//!   database connections) lent out one caller at a time.
//! - [`TaskQueue`]: an unbounded FIFO of [`Task`]s with a "no more
//!   input" signal.
//! - [`WorkerGroup`]: worker threads that drain a [`TaskQueue`], run
//!   each task with an [`Executor`] on a leased resource and collect the
//!   [`TaskResult`]s.
//! - [`TaskPool`]: a self-contained pool of worker threads running
//!   arbitrary closures, with a blocking wait for completion.
//!
//! # Examples
//!
//! ```
//! use workpool::{ResourcePool, Task, TaskQueue, WorkerGroupBuilder};
//!
//! let pool = ResourcePool::new("database_connection_string", 10, |conf| conf.to_string());
//! let queue = TaskQueue::new();
//! let group = WorkerGroupBuilder::default()
//!     .worker_count(5)
//!     .spawn(&queue, &pool, |_conn: &mut String, query: &str| {
//!         format!("result of '{}'", query)
//!     });
//!
//! for user_id in 1..=100 {
//!     let query = format!("select * from test where userId = {}", user_id);
//!     queue.enqueue(Task::new(user_id, query)).unwrap();
//! }
//!
//! // No more tasks: the workers stop once the queue is drained.
//! queue.close_input();
//!
//! let report = group.join().unwrap();
//! assert_eq!(100, report.processed());
//! ```

mod builder;
mod resource_pool;
mod task_pool;
mod task_queue;
mod worker_group;

pub(crate) mod task;
pub(crate) mod worker;

pub use builder::{TaskPoolBuilder, WorkerGroupBuilder};
pub use resource_pool::*;
pub use task::{Task, TaskResult};
pub use task_pool::{PoolReport, TaskPool, TaskPoolError};
pub use task_queue::*;
pub use worker::ThreadFactory;
pub use worker_group::*;
