use crate::error::WorkerError;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A long-running unit of work registered with a `WorkerPool`.
///
/// The pool only ever calls `process`. `name` and `health` are there for whoever
/// owns the workers, e.g. a liveness probe walking `WorkerPool::workers()`.
#[async_trait]
pub trait Worker: Send + Sync {
  fn name(&self) -> &str;

  fn health(&self) -> bool {
    true
  }

  /// Runs until the work is done or `shutdown` is cancelled.
  ///
  /// Cancellation is cooperative: the pool never interrupts a running `process`,
  /// so implementations that want to stop on `WorkerPool::close` must watch the
  /// token, typically with `tokio::select!` on `shutdown.cancelled()`.
  async fn process(&self, shutdown: CancellationToken) -> Result<(), WorkerError>;
}
