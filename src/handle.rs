use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use crate::errors::{TaskError, TaskResult};

/// Producer half of a result slot. Filled exactly once by the worker that
/// executes the task.
pub(crate) struct Promise<R> {
    tx: Sender<TaskResult<R>>,
}

impl<R> Promise<R> {
    pub(crate) fn fulfill(self, result: TaskResult<R>) {
        // The caller may have dropped the future; the result is then discarded.
        let _ = self.tx.send(result);
    }
}

/// Creates a linked result slot: the promise goes into the enqueued wrapper,
/// the future back to the caller.
pub(crate) fn result_slot<R>() -> (Promise<R>, TaskFuture<R>) {
    let (tx, rx) = channel::bounded(1);
    (Promise { tx }, TaskFuture { rx })
}

/// Caller-side handle for one task's outcome.
///
/// Resolving the future blocks until the task has run and yields its value,
/// or the failure it raised.
pub struct TaskFuture<R> {
    rx: Receiver<TaskResult<R>>,
}

impl<R> TaskFuture<R> {
    /// Blocks until the outcome is available and consumes the handle.
    pub fn wait(self) -> TaskResult<R> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(TaskError::Disconnected),
        }
    }

    /// Non-blocking probe; `None` while the task has not finished.
    pub fn try_wait(&self) -> Option<TaskResult<R>> {
        self.rx.try_recv().ok()
    }

    /// Converts into a shareable view that any number of observers can wait
    /// on, each seeing the same outcome.
    pub fn shared(self) -> SharedFuture<R> {
        SharedFuture {
            inner: Arc::new(SharedInner {
                state: Mutex::new(SharedState::Pending(self.rx)),
                ready: Condvar::new(),
            }),
        }
    }
}

enum SharedState<R> {
    /// Nobody has started waiting; the receiver is still in the cell.
    Pending(Receiver<TaskResult<R>>),
    /// One observer is blocked on the receiver; the rest wait on the condvar.
    Waiting,
    Ready(TaskResult<R>),
}

struct SharedInner<R> {
    state: Mutex<SharedState<R>>,
    ready: Condvar,
}

/// Cloneable view over a result slot; every clone resolves to the same
/// outcome. This is the handle the completion helpers operate on.
pub struct SharedFuture<R> {
    inner: Arc<SharedInner<R>>,
}

// Manual impl: sharing the view never requires R: Clone, only resolving it.
impl<R> Clone for SharedFuture<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Clone> SharedFuture<R> {
    /// Blocks until the outcome is available.
    ///
    /// The first observer receives from the slot and publishes the outcome;
    /// later observers read the cached copy.
    pub fn wait(&self) -> TaskResult<R> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            match &*state {
                SharedState::Ready(result) => return result.clone(),
                SharedState::Waiting => {
                    state = self.inner.ready.wait(state).unwrap();
                }
                SharedState::Pending(_) => {
                    let SharedState::Pending(rx) =
                        std::mem::replace(&mut *state, SharedState::Waiting)
                    else {
                        unreachable!()
                    };
                    drop(state);

                    let result = match rx.recv() {
                        Ok(result) => result,
                        Err(_) => Err(TaskError::Disconnected),
                    };

                    let mut published = self.inner.state.lock().unwrap();
                    *published = SharedState::Ready(result.clone());
                    drop(published);
                    self.inner.ready.notify_all();
                    return result;
                }
            }
        }
    }
}

/// Awaits `future` on a detached thread and calls `callback` with the value
/// if the task succeeded. A failure is silently discarded.
///
/// The observer thread is independent of any pool and remains valid after
/// pool teardown.
pub fn on_success<R, S>(future: SharedFuture<R>, callback: S)
where
    R: Clone + Send + 'static,
    S: FnOnce(R) + Send + 'static,
{
    thread::spawn(move || {
        if let Ok(value) = future.wait() {
            callback(value);
        }
    });
}

/// Awaits `future` on a detached thread and calls `callback` with the failure
/// if the task failed. A success is silently discarded.
pub fn on_failure<R, F>(future: SharedFuture<R>, callback: F)
where
    R: Clone + Send + 'static,
    F: FnOnce(TaskError) + Send + 'static,
{
    thread::spawn(move || {
        if let Err(err) = future.wait() {
            callback(err);
        }
    });
}

/// Awaits `future` on a detached thread and routes the outcome to exactly one
/// of the two callbacks.
pub fn on_complete<R, S, F>(future: SharedFuture<R>, on_value: S, on_error: F)
where
    R: Clone + Send + 'static,
    S: FnOnce(R) + Send + 'static,
    F: FnOnce(TaskError) + Send + 'static,
{
    thread::spawn(move || match future.wait() {
        Ok(value) => on_value(value),
        Err(err) => on_error(err),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn future_resolves_to_fulfilled_value() {
        let (promise, future) = result_slot();
        promise.fulfill(Ok(5));
        assert_eq!(future.wait(), Ok(5));
    }

    #[test]
    fn dropped_promise_reports_disconnected() {
        let (promise, future) = result_slot::<i32>();
        drop(promise);
        assert_eq!(future.wait(), Err(TaskError::Disconnected));
    }

    #[test]
    fn try_wait_is_nonblocking() {
        let (promise, future) = result_slot();
        assert!(future.try_wait().is_none());
        promise.fulfill(Ok("done"));
        assert_eq!(future.try_wait(), Some(Ok("done")));
    }

    #[test]
    fn shared_future_serves_every_observer() {
        let (promise, future) = result_slot();
        let shared = future.shared();

        let observers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || shared.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        promise.fulfill(Ok(42));

        for observer in observers {
            assert_eq!(observer.join().unwrap(), Ok(42));
        }
        assert_eq!(shared.wait(), Ok(42));
    }

    #[test]
    fn helpers_route_exactly_one_branch() {
        let (ok_promise, ok_future) = result_slot();
        let (err_promise, err_future) = result_slot::<i32>();

        let (tx, rx) = channel::unbounded();

        let t1 = tx.clone();
        let t2 = tx.clone();
        on_complete(
            ok_future.shared(),
            move |v| t1.send(format!("ok:{v}")).unwrap(),
            move |e| t2.send(format!("err:{e}")).unwrap(),
        );
        let t3 = tx.clone();
        on_failure(err_future.shared(), move |e| {
            t3.send(format!("err:{e}")).unwrap()
        });

        ok_promise.fulfill(Ok(1));
        err_promise.fulfill(Err(TaskError::Panicked("boom".into())));

        let mut seen: Vec<_> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(
            seen,
            vec!["err:task panicked: boom".to_owned(), "ok:1".to_owned()]
        );
    }
}
