use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dispatch_pool::{Task, TaskPool};

fn main() {
    let count = 1_000_000;
    let now = Instant::now();

    let pool = TaskPool::new();
    let executed = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<Task> = (0..count)
        .map(|_| {
            let executed = Arc::clone(&executed);
            Task::new(move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    pool.dispatch_bulk(tasks).expect("dispatch failed");
    pool.shutdown();

    assert_eq!(executed.load(Ordering::Relaxed), count);
    println!("ran {} tasks in {:?}", count, now.elapsed());
}
