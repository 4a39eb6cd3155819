//! A fixed-size pool of worker threads for running nullary tasks with
//! bounded parallelism.
//!
//! Features:
//!
//! - Fire-and-forget and value-returning dispatch, single or bulk
//! - Synchronous fan-out-join, ordered serial batches, once-only dispatch
//! - Result slots exposed as blocking futures, with a shareable view and
//!   detached completion observers
//! - Shutdown that runs every accepted task exactly once before returning
//!
//! ## Example
//!
//! ```
//! use dispatch_pool::{Task, TaskPool};
//!
//! let pool = TaskPool::with_workers(4);
//!
//! let future = pool.dispatch_with_handle(Task::new(|| 2 + 2)).unwrap();
//! assert_eq!(future.wait(), Ok(4));
//! ```

mod errors;
mod handle;
mod pool;
mod queue;
mod task;

pub use crate::{
    errors::{DispatchError, DispatchResult, TaskError, TaskResult},
    handle::{on_complete, on_failure, on_success, SharedFuture, TaskFuture},
    pool::TaskPool,
    task::{OnceFlag, Task},
};
