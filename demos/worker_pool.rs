//! Runs 10 closures on a pool of 4 workers and waits for them.
//!
//! `cargo run --example worker_pool`

use log::{error, info};
use workpool::TaskPool;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let pool = TaskPool::new(4);
    for i in 0..10 {
        if let Err(err) = pool.execute(move || info!("Task {} is being processed", i)) {
            error!("Task {} rejected: {}", i, err);
        }
    }

    pool.wait_until_done();

    match pool.join() {
        Ok(report) => info!(
            "Completed {}, panicked {}, discarded {}",
            report.completed, report.panicked, report.discarded
        ),
        Err(_) => error!("A worker panicked"),
    }
}
