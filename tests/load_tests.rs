#[cfg(test)]
mod tests {
    use dispatch_pool::{Task, TaskPool};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn measure<T>(name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        println!("{}: {:?}", name, start.elapsed());
        result
    }

    #[test]
    fn load_bulk_fast_tasks() {
        let pool = TaskPool::new();
        let counter = Arc::new(AtomicUsize::new(0));

        measure("100k bulk tasks", || {
            let tasks: Vec<Task> = (0..100_000)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    Task::new(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                })
                .collect();
            pool.dispatch_bulk(tasks).unwrap();
            pool.shutdown();
        });

        assert_eq!(counter.load(Ordering::Relaxed), 100_000);
    }

    #[test]
    fn load_handles_round_trip() {
        let pool = TaskPool::new();

        let results = measure("10k handle round trips", || {
            let tasks: Vec<Task<u64>> = (0..10_000u64).map(|i| Task::new(move || i * 2)).collect();
            pool.dispatch_sync_with_results(tasks).unwrap()
        });

        let total: u64 = results.into_iter().map(|r| r.unwrap()).sum();
        assert_eq!(total, (0..10_000u64).map(|i| i * 2).sum());
    }

    #[test]
    fn load_serial_batches_interleaved_with_bulk() {
        let pool = TaskPool::with_workers(4);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let noise = Arc::new(AtomicUsize::new(0));

        for batch in 0..50usize {
            let serial: Vec<Task> = (0..20usize)
                .map(|i| {
                    let order = Arc::clone(&order);
                    Task::new(move || order.lock().unwrap().push((batch, i)))
                })
                .collect();
            pool.dispatch_serial(serial).unwrap();

            let bulk: Vec<Task> = (0..20)
                .map(|_| {
                    let noise = Arc::clone(&noise);
                    Task::new(move || {
                        noise.fetch_add(1, Ordering::Relaxed);
                    })
                })
                .collect();
            pool.dispatch_bulk(bulk).unwrap();
        }

        pool.shutdown();
        assert_eq!(noise.load(Ordering::Relaxed), 1000);

        // Unrelated tasks may interleave between batches, but within each
        // batch the order is the input order.
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 1000);
        for batch in 0..50usize {
            let positions: Vec<_> = order.iter().filter(|(b, _)| *b == batch).collect();
            for (expected, (_, i)) in positions.into_iter().enumerate() {
                assert_eq!(*i, expected);
            }
        }
    }

    /// Every dispatch that was accepted must execute exactly once, even with
    /// shutdown racing the dispatchers.
    #[test]
    fn load_no_accepted_task_is_lost_across_shutdown() {
        for _ in 0..20 {
            let pool = Arc::new(TaskPool::with_workers(4));
            let accepted = Arc::new(AtomicUsize::new(0));
            let executed = Arc::new(AtomicUsize::new(0));

            let dispatchers: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    let accepted = Arc::clone(&accepted);
                    let executed = Arc::clone(&executed);
                    std::thread::spawn(move || {
                        for _ in 0..500 {
                            let executed = Arc::clone(&executed);
                            let task = Task::new(move || {
                                executed.fetch_add(1, Ordering::Relaxed);
                            });
                            match pool.dispatch(task) {
                                Ok(()) => {
                                    accepted.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(_) => break,
                            }
                        }
                    })
                })
                .collect();

            std::thread::yield_now();
            pool.shutdown();
            for dispatcher in dispatchers {
                dispatcher.join().unwrap();
            }

            assert_eq!(
                executed.load(Ordering::Relaxed),
                accepted.load(Ordering::Relaxed)
            );
        }
    }

    #[test]
    fn load_many_once_flags_under_contention() {
        let pool = TaskPool::new();
        let counters: Vec<_> = (0..100)
            .map(|_| {
                (
                    dispatch_pool::OnceFlag::new(),
                    Arc::new(AtomicUsize::new(0)),
                )
            })
            .collect();

        for _ in 0..10 {
            for (flag, counter) in &counters {
                let counter = Arc::clone(counter);
                pool.dispatch_once(
                    flag,
                    Task::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
            }
        }

        pool.shutdown();
        for (_, counter) in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }
}
