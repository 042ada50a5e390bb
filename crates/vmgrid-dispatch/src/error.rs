//! Dispatch error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("remote execution of {script} via {control:?} failed: {message}")]
    Remote {
        control: String,
        script: String,
        message: String,
    },

    #[error("request cancelled before {script} was acknowledged")]
    Cancelled { script: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;
