use std::fmt;
use std::sync::{Arc, Once};

pub(crate) type Call<R> = Box<dyn FnOnce() -> R + Send + 'static>;

/// A unit of work for the pool: a callable taking no arguments and producing
/// an `R` (or nothing, for `Task<()>`).
///
/// A task either holds a callable or is [`empty`](Task::empty). Empty tasks
/// exist so the dispatch surface can reject them up front with
/// [`InvalidTask`](crate::DispatchError::InvalidTask); the pool itself never
/// executes one.
pub struct Task<R = ()> {
    call: Option<Call<R>>,
}

impl<R> Task<R> {
    /// Wraps a callable into a task.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
    {
        Self {
            call: Some(Box::new(f)),
        }
    }

    /// The distinguished task with no callable.
    pub fn empty() -> Self {
        Self { call: None }
    }

    /// Whether this task has no callable.
    pub fn is_empty(&self) -> bool {
        self.call.is_none()
    }

    /// Extracts the callable, if any. The acceptance gate consumes tasks
    /// through this so only admitted callables ever reach the queue.
    pub(crate) fn into_call(self) -> Option<Call<R>> {
        self.call
    }
}

impl<R, F> From<F> for Task<R>
where
    F: FnOnce() -> R + Send + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// A cloneable once-latch: of all tasks run through the same flag, at most
/// one completes; attempts after a completed run are no-ops.
///
/// A run that panics does not consume the latch, so a later attempt may still
/// run. Clones share the underlying latch.
#[derive(Clone)]
pub struct OnceFlag {
    inner: Arc<Once>,
}

impl Default for OnceFlag {
    fn default() -> Self {
        Self {
            inner: Arc::new(Once::new()),
        }
    }
}

impl OnceFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run has completed through this flag.
    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    /// Runs `f` if no run has completed yet.
    pub(crate) fn call_once<F: FnOnce()>(&self, f: F) {
        // call_once_force: a poisoned (panicked) earlier attempt does not
        // wedge the latch.
        self.inner.call_once_force(|_| f());
    }
}

impl fmt::Debug for OnceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceFlag")
            .field("completed", &self.is_completed())
            .finish()
    }
}
