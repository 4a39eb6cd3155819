use std::any::Any;

use thiserror::Error;

/// Error returned synchronously when a dispatch is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("task pool already destroyed")]
    PoolDestroyed,
    #[error("task has no target callable object")]
    InvalidTask,
}

/// Error observed through a future when a task did not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task panicked; the payload is rendered into the message.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The result slot was dropped before it was filled.
    #[error("task result slot disconnected")]
    Disconnected,
}

pub type DispatchResult<T> = Result<T, DispatchError>;
pub type TaskResult<T> = Result<T, TaskError>;

/// Renders a panic payload into a message for [`TaskError::Panicked`].
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
