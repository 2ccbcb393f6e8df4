//! Runs 1000 simulated queries through 5 workers sharing a pool of 10
//! connections.
//!
//! `RUST_LOG=debug cargo run --example connection_pool`

use std::{thread, time::Duration};

use log::info;
use workpool::{ResourcePool, Task, TaskQueue, WorkerGroupBuilder};

const MAX_CONNECTIONS: usize = 10;
const NUM_USERS: u64 = 1000;
const NUM_WORKERS: usize = 5;

struct DatabaseConnection {
    conn_str: String,
}

impl DatabaseConnection {
    fn connect(conn_str: &str) -> Self {
        info!("Connecting to {}", conn_str);
        Self {
            conn_str: conn_str.to_string(),
        }
    }

    fn execute(&mut self, query: &str) -> String {
        thread::sleep(Duration::from_millis(100));
        format!("result of '{}' on {}", query, self.conn_str)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let pool = ResourcePool::new(
        "database_connection_string",
        MAX_CONNECTIONS,
        DatabaseConnection::connect,
    );
    let queue = TaskQueue::new();
    let group = WorkerGroupBuilder::default()
        .worker_count(NUM_WORKERS)
        .thread_name("query-worker")
        .spawn(&queue, &pool, DatabaseConnection::execute);

    for user_id in 1..=NUM_USERS {
        let query = format!("select * from test where userId = {}", user_id);
        if let Err(err) = queue.enqueue(Task::new(user_id, query)) {
            log::error!("{}", err);
        }
    }
    queue.close_input();

    match group.join() {
        Ok(report) => {
            for result in &report.results {
                info!("User {}: {}", result.id, result.output);
            }
            info!(
                "Processed {}, abandoned {}, unclaimed {}",
                report.processed(),
                report.abandoned.len(),
                report.unclaimed
            );
        }
        Err(_) => log::error!("A query worker panicked"),
    }
}
