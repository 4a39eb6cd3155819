use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread;

use tracing::{debug, trace, warn};

use crate::errors::{panic_message, DispatchError, DispatchResult, TaskError, TaskResult};
use crate::handle::{result_slot, Promise, TaskFuture};
use crate::queue::{Item, TaskQueue};
use crate::task::{Call, OnceFlag, Task};

/// A fixed-size group of worker threads executing dispatched tasks.
///
/// Workers pull tasks off a shared queue in enqueue order and run each to
/// completion; completion order across workers is unspecified. Dropping the
/// pool (or calling [`shutdown`](TaskPool::shutdown)) seals it against new
/// dispatches and then runs every task that was already accepted, so accepted
/// work is executed exactly once.
///
/// All dispatch operations may be called concurrently from any thread. A task
/// that dispatches back into its own pool and blocks on the result can
/// deadlock once every worker is doing the same; keep intra-pool waits out of
/// task bodies.
pub struct TaskPool {
    queue: Arc<TaskQueue>,
    destroyed: Arc<AtomicBool>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    worker_count: usize,
}

impl TaskPool {
    /// Creates a pool with one worker per logical CPU (at least one).
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get())
    }

    /// Creates a pool with `workers` threads (clamped to at least one).
    pub fn with_workers(workers: usize) -> Self {
        let worker_count = workers.max(1);
        let queue = Arc::new(TaskQueue::new());

        debug!(workers = worker_count, "starting task pool");
        let handles = (0..worker_count)
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::Builder::new()
                    .name(format!("pool-worker-{i}"))
                    .spawn(move || worker_loop(&queue))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            queue,
            destroyed: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(handles),
            worker_count,
        }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Whether the pool has been sealed by [`shutdown`](TaskPool::shutdown)
    /// or drop.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Enqueues a single task. There is no handle; a task that panics unwinds
    /// the worker that ran it. Use [`dispatch_with_handle`] to observe
    /// failures.
    ///
    /// [`dispatch_with_handle`]: TaskPool::dispatch_with_handle
    pub fn dispatch(&self, task: Task) -> DispatchResult<()> {
        let call = self.admit(task)?;
        self.queue.enqueue(Item::Run(call));
        Ok(())
    }

    /// Enqueues a value-returning task and hands back the future for its
    /// result slot. The worker stores either the produced value or the
    /// captured failure; the caller observes it through
    /// [`TaskFuture::wait`].
    pub fn dispatch_with_handle<R>(&self, task: Task<R>) -> DispatchResult<TaskFuture<R>>
    where
        R: Send + 'static,
    {
        let call = self.admit(task)?;
        let (promise, future) = result_slot();
        self.queue.enqueue(Item::Run(run_into_slot(call, promise)));
        Ok(future)
    }

    /// Enqueues a batch of independent tasks. The whole batch is validated
    /// before any element is enqueued; an invalid element rejects the batch
    /// atomically.
    pub fn dispatch_bulk(&self, tasks: Vec<Task>) -> DispatchResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let calls = self.admit_batch(tasks)?;
        self.queue.enqueue_bulk(calls.into_iter().map(Item::Run));
        Ok(())
    }

    /// Enqueues a batch of independent value-returning tasks; the returned
    /// futures are in input order. Tasks execute concurrently and may
    /// complete in any order.
    pub fn dispatch_bulk_with_handles<R>(
        &self,
        tasks: Vec<Task<R>>,
    ) -> DispatchResult<Vec<TaskFuture<R>>>
    where
        R: Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let calls = self.admit_batch(tasks)?;
        let mut futures = Vec::with_capacity(calls.len());
        let items: Vec<Item> = calls
            .into_iter()
            .map(|call| {
                let (promise, future) = result_slot();
                futures.push(future);
                Item::Run(run_into_slot(call, promise))
            })
            .collect();
        self.queue.enqueue_bulk(items);
        Ok(futures)
    }

    /// Dispatches a batch and blocks until every task in it has run.
    ///
    /// Task failures are not surfaced here: a panicking task still counts as
    /// completed for the join (so the caller always unblocks) and its failure
    /// propagates to worker scope. Use
    /// [`dispatch_sync_with_results`](TaskPool::dispatch_sync_with_results)
    /// to observe failures.
    pub fn dispatch_sync(&self, tasks: Vec<Task>) -> DispatchResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let calls = self.admit_batch(tasks)?;
        let join = Arc::new(SyncJoin::new(calls.len()));
        let items: Vec<Item> = calls
            .into_iter()
            .map(|call| {
                let join = Arc::clone(&join);
                Item::Run(Box::new(move || {
                    // Count down even if the task panics, or the caller would
                    // block forever on a dead worker.
                    let _done = CompletionGuard { join };
                    call();
                }) as Box<dyn FnOnce() + Send + 'static>)
            })
            .collect();
        self.queue.enqueue_bulk(items);
        join.wait_all();
        Ok(())
    }

    /// Dispatches a batch of value-returning tasks, blocks on every result
    /// and returns them in input order. Failures surface positionally.
    pub fn dispatch_sync_with_results<R>(
        &self,
        tasks: Vec<Task<R>>,
    ) -> DispatchResult<Vec<TaskResult<R>>>
    where
        R: Send + 'static,
    {
        let futures = self.dispatch_bulk_with_handles(tasks)?;
        Ok(futures.into_iter().map(TaskFuture::wait).collect())
    }

    /// Packages the batch as one composite task: the inputs run back-to-back
    /// in input order on a single worker, without interleaving among
    /// themselves. A panicking input abandons the rest of the batch and
    /// unwinds the worker.
    pub fn dispatch_serial(&self, tasks: Vec<Task>) -> DispatchResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let calls = self.admit_batch(tasks)?;
        self.queue.enqueue(Item::Run(Box::new(move || {
            for call in calls {
                call();
            }
        })));
        Ok(())
    }

    /// Serial batch with one result slot per input, preallocated and set in
    /// input order. Later inputs run whether or not earlier ones failed;
    /// every slot is populated independently.
    pub fn dispatch_serial_with_handles<R>(
        &self,
        tasks: Vec<Task<R>>,
    ) -> DispatchResult<Vec<TaskFuture<R>>>
    where
        R: Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let calls = self.admit_batch(tasks)?;
        let mut futures = Vec::with_capacity(calls.len());
        let mut slotted = Vec::with_capacity(calls.len());
        for call in calls {
            let (promise, future) = result_slot();
            futures.push(future);
            slotted.push((call, promise));
        }
        self.queue.enqueue(Item::Run(Box::new(move || {
            for (call, promise) in slotted {
                let outcome = panic::catch_unwind(AssertUnwindSafe(call))
                    .map_err(|payload| TaskError::Panicked(panic_message(payload)));
                promise.fulfill(outcome);
            }
        })));
        Ok(futures)
    }

    /// Enqueues `task` wrapped in `flag`: of all tasks dispatched through the
    /// same flag, at most one runs to completion; the rest become no-ops.
    pub fn dispatch_once(&self, flag: &OnceFlag, task: Task) -> DispatchResult<()> {
        let call = self.admit(task)?;
        let flag = flag.clone();
        self.queue.enqueue(Item::Run(Box::new(move || flag.call_once(call))));
        Ok(())
    }

    /// Seals the pool and tears it down: no further dispatch is accepted,
    /// workers are signalled and joined, and drainer threads execute whatever
    /// the workers left on the queue. Every task accepted before the seal has
    /// run by the time this returns. Idempotent; also invoked by `Drop`.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock().unwrap();
        if workers.is_empty() {
            return;
        }

        debug!(workers = self.worker_count, "sealing task pool");
        self.destroyed.store(true, Ordering::Release);
        for _ in 0..self.worker_count {
            self.queue.enqueue(Item::Shutdown);
        }
        for worker in workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread exited by panic");
            }
        }
        drop(workers);

        self.drain();
        debug!("task pool shut down");
    }

    /// The acceptance gate: rejects once the pool is sealed, and rejects
    /// empty tasks. Admission yields the inner callable, so nothing invalid
    /// can reach the queue.
    fn admit<R>(&self, task: Task<R>) -> DispatchResult<Call<R>> {
        if self.is_destroyed() {
            return Err(DispatchError::PoolDestroyed);
        }
        task.into_call().ok_or(DispatchError::InvalidTask)
    }

    /// Batch admission: every element is validated before any is enqueued.
    fn admit_batch<R>(&self, tasks: Vec<Task<R>>) -> DispatchResult<Vec<Call<R>>> {
        if self.is_destroyed() {
            return Err(DispatchError::PoolDestroyed);
        }
        tasks
            .into_iter()
            .map(|task| task.into_call().ok_or(DispatchError::InvalidTask))
            .collect()
    }

    /// Drain phase of shutdown. One drainer per former worker pulls leftover
    /// tasks with the non-blocking probe; the pool is quiescent only when a
    /// whole round ends with no drainer having seen work, decided by all
    /// drainers together at a barrier.
    fn drain(&self) {
        debug!("draining task queue");
        let barrier = Arc::new(Barrier::new(self.worker_count));
        let progress = Arc::new(AtomicBool::new(false));

        let drainers: Vec<_> = (0..self.worker_count)
            .map(|i| {
                let queue = Arc::clone(&self.queue);
                let barrier = Arc::clone(&barrier);
                let progress = Arc::clone(&progress);
                thread::Builder::new()
                    .name(format!("pool-drainer-{i}"))
                    .spawn(move || drainer_loop(&queue, &barrier, &progress))
                    .expect("failed to spawn drainer thread")
            })
            .collect();

        for drainer in drainers {
            if drainer.join().is_err() {
                warn!("drainer thread exited by panic");
            }
        }
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wraps an admitted callable so its outcome lands in the result slot instead
/// of unwinding the worker.
fn run_into_slot<R>(call: Call<R>, promise: Promise<R>) -> Box<dyn FnOnce() + Send + 'static>
where
    R: Send + 'static,
{
    Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(call))
            .map_err(|payload| TaskError::Panicked(panic_message(payload)));
        promise.fulfill(outcome);
    })
}

/// Countdown the synchronous fan-out blocks on.
struct SyncJoin {
    remaining: Mutex<usize>,
    all_done: Condvar,
}

impl SyncJoin {
    fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            all_done: Condvar::new(),
        }
    }

    fn complete_one(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        *remaining -= 1;
        if *remaining == 0 {
            self.all_done.notify_all();
        }
    }

    fn wait_all(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        while *remaining > 0 {
            remaining = self.all_done.wait(remaining).unwrap();
        }
    }
}

/// Decrements the countdown on drop, so a panicking task still completes the
/// join.
struct CompletionGuard {
    join: Arc<SyncJoin>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.join.complete_one();
    }
}

fn worker_loop(queue: &TaskQueue) {
    let token = queue.consumer_token();
    trace!("worker started");
    loop {
        match token.wait_dequeue() {
            Item::Run(call) => call(),
            Item::Shutdown => break,
        }
    }
    trace!("worker stopping");
}

fn drainer_loop(queue: &TaskQueue, barrier: &Barrier, progress: &AtomicBool) {
    let token = queue.consumer_token();
    loop {
        let mut saw_work = false;
        while let Some(item) = token.try_dequeue() {
            if let Item::Run(call) = item {
                // A leftover task must not take the drainer out mid-round;
                // the barrier below needs every participant.
                let _ = panic::catch_unwind(AssertUnwindSafe(call));
            }
            // Sentinels a dead worker never consumed are skipped.
            saw_work = true;
        }
        if saw_work || !queue.is_empty() {
            progress.store(true, Ordering::Release);
        }

        // Two-phase quiescence: the exit decision is read uniformly by every
        // drainer between the first two rendezvous, the leader resets the
        // round flag, and the third rendezvous publishes the reset before the
        // next pass may set it again.
        barrier.wait();
        let quiescent = !progress.load(Ordering::Acquire);
        if barrier.wait().is_leader() {
            progress.store(false, Ordering::Release);
        }
        barrier.wait();

        if quiescent {
            trace!("drainer quiescent");
            break;
        }
    }
}
