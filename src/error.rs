use std::fmt;

use thiserror::Error;

/// Errors returned by the `WorkerPool` lifecycle operations.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Worker pool has already been started and cannot accept new workers or be restarted")]
  AlreadyStarted,

  #[error("Worker pool has not been started; there is no run to wait for")]
  NotStarted,

  #[error("Worker instance is already registered with this pool")]
  DuplicateWorker,
}

/// Errors a `Worker::process` call may finish with.
///
/// None of these escape the pool: each one ends only the unit that produced it
/// and is reported through the pool's logger.
#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("worker failed: {0}")]
  Failed(String),

  /// The worker hit a condition it cannot recover from. Usually produced by
  /// `Logger::panic`, which has already logged the cause.
  #[error("worker aborted: {0}")]
  Unrecoverable(String),

  #[error(transparent)]
  Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl WorkerError {
  pub fn failed(reason: impl fmt::Display) -> Self {
    WorkerError::Failed(reason.to_string())
  }

  pub fn is_unrecoverable(&self) -> bool {
    matches!(self, WorkerError::Unrecoverable(_))
  }
}
