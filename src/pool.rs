use crate::error::{PoolError, WorkerError};
use crate::logger::{self, Logger, LoggerError};
use crate::value::LogValue;
use crate::worker::Worker;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use futures_intrusive::sync::ManualResetEvent;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const POOL_LOG_GROUP: &str = "worker pool";

/// Lifecycle of a `WorkerPool`. A pool moves forward only; `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
  /// Accepting registrations, nothing running.
  Idle,
  /// `start` has launched the units and is waiting on them.
  Running,
  /// Every unit has returned and the completion event has fired.
  Finished,
}

impl fmt::Display for PoolState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PoolState::Idle => f.write_str("idle"),
      PoolState::Running => f.write_str("running"),
      PoolState::Finished => f.write_str("finished"),
    }
  }
}

/// Runs a fixed set of workers concurrently until all of them return.
///
/// Register workers, then drive `start` on one task (or call `spawn` and keep the
/// handle) and, if a shutdown is wanted, call `close` from another. Failures of a
/// single worker (an `Err` or a panic) are logged and end only that worker's unit;
/// `start` itself never reports them.
///
/// Completion is tracked by a supervisor task owned by the runtime, so a `start`
/// future that is dropped early (for instance by a losing `select!` branch) still
/// lets the pool reach `Finished` and release every `close` caller.
pub struct WorkerPool {
  shutdown_token: CancellationToken,
  workers: Mutex<Vec<Arc<dyn Worker>>>,
  active_units: Arc<AtomicUsize>,
  shared: Arc<PoolShared>,
}

/// State the supervisor task needs after `spawn` has returned.
struct PoolShared {
  state: Mutex<PoolState>,
  finished: ManualResetEvent,
  logger: Logger,
}

impl fmt::Debug for WorkerPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerPool")
      .field("state", &self.state())
      .field("workers", &self.worker_count())
      .field("active_units", &self.active_worker_count())
      .field("shutdown_requested", &self.shutdown_token.is_cancelled())
      .finish()
  }
}

impl WorkerPool {
  pub fn new(logger: &Logger) -> Self {
    Self {
      shutdown_token: CancellationToken::new(),
      workers: Mutex::new(Vec::new()),
      active_units: Arc::new(AtomicUsize::new(0)),
      shared: Arc::new(PoolShared {
        state: Mutex::new(PoolState::Idle),
        finished: ManualResetEvent::new(false),
        logger: logger.with_group(POOL_LOG_GROUP),
      }),
    }
  }

  /// Builds a pool that logs through the process-wide logger from `logger::init`.
  pub fn from_global() -> Result<Self, LoggerError> {
    Ok(Self::new(&logger::try_instance()?))
  }

  /// Adds `worker` to the pool. Workers run in no particular order, but `workers()`
  /// reports them in registration order.
  ///
  /// # Errors
  /// `PoolError::AlreadyStarted` once `start` or `spawn` has been called.
  /// `PoolError::DuplicateWorker` if this exact instance is already registered.
  pub fn register(&self, worker: Arc<dyn Worker>) -> Result<(), PoolError> {
    let state = self.shared.state.lock();
    if *state != PoolState::Idle {
      drop(state);
      self.shared.logger.warn("registration rejected, pool already started", &[]);
      return Err(PoolError::AlreadyStarted);
    }

    let mut workers = self.workers.lock();
    if workers.iter().any(|existing| same_instance(existing, &worker)) {
      return Err(PoolError::DuplicateWorker);
    }
    workers.push(worker);
    Ok(())
  }

  /// Like `register`, but an absent worker is silently ignored.
  pub fn register_optional(&self, worker: Option<Arc<dyn Worker>>) -> Result<(), PoolError> {
    match worker {
      Some(worker) => self.register(worker),
      None => Ok(()),
    }
  }

  pub fn worker_count(&self) -> usize {
    self.workers.lock().len()
  }

  /// Snapshot of the registered workers, in registration order.
  pub fn workers(&self) -> Vec<Arc<dyn Worker>> {
    self.workers.lock().clone()
  }

  pub fn state(&self) -> PoolState {
    *self.shared.state.lock()
  }

  /// Number of units whose `process` call has not returned yet.
  pub fn active_worker_count(&self) -> usize {
    self.active_units.load(AtomicOrdering::SeqCst)
  }

  /// The token every unit receives. Cancelled by `close`.
  pub fn shutdown_token(&self) -> CancellationToken {
    self.shutdown_token.clone()
  }

  pub fn is_finished(&self) -> bool {
    self.shared.finished.is_set()
  }

  /// Moves the pool to `Running` and launches every registered worker, without
  /// waiting for them. The returned handle resolves once all units have returned
  /// and the pool is `Finished`; dropping it detaches the run, it does not stop it.
  ///
  /// # Errors
  /// `PoolError::AlreadyStarted` if the pool has been started before. A pool runs once.
  ///
  /// # Panics
  /// Panics if called outside a Tokio runtime.
  pub fn spawn(&self) -> Result<JoinHandle<()>, PoolError> {
    let workers = {
      let mut state = self.shared.state.lock();
      if *state != PoolState::Idle {
        let current = *state;
        drop(state);
        self
          .shared
          .logger
          .warn("start rejected, pool already ran", &[("state", LogValue::display(current))]);
        return Err(PoolError::AlreadyStarted);
      }
      *state = PoolState::Running;
      self.workers.lock().clone()
    };

    self.shared.logger.info("worker pool starting", &[("workers", workers.len().into())]);

    let unit_handles: Vec<JoinHandle<Result<(), WorkerError>>> = workers
      .into_iter()
      .enumerate()
      .map(|(unit, worker)| {
        let active_guard = ActiveUnitGuard::acquire(&self.active_units);
        tokio::spawn(Self::run_unit(
          unit,
          worker,
          self.shutdown_token.clone(),
          self.shared.logger.clone(),
          active_guard,
        ))
      })
      .collect();

    Ok(tokio::spawn(Self::supervise(unit_handles, self.shared.clone())))
  }

  /// Runs every registered worker concurrently and resolves once all of them have
  /// returned, whatever their outcome.
  ///
  /// # Errors
  /// `PoolError::AlreadyStarted` if the pool has been started before. A pool runs once.
  pub async fn start(&self) -> Result<(), PoolError> {
    let supervisor = self.spawn()?;
    if let Err(join_error) = supervisor.await {
      self
        .shared
        .logger
        .error("worker pool supervisor aborted", &[("error", LogValue::display(&join_error))]);
    }
    Ok(())
  }

  /// Requests cooperative shutdown and waits until every unit of the run has returned.
  ///
  /// The shutdown token is cancelled even when the pool has not been started yet, so
  /// a `close` that races ahead of a spawned `start` is not lost: the run that follows
  /// hands its workers an already cancelled token.
  ///
  /// # Errors
  /// `PoolError::NotStarted` if no run has begun; there is nothing to wait for.
  pub async fn close(&self) -> Result<(), PoolError> {
    if self.state() == PoolState::Idle {
      self.shutdown_token.cancel();
      self
        .shared
        .logger
        .warn("close before start, shutdown requested for the coming run", &[]);
      return Err(PoolError::NotStarted);
    }

    self.shared.logger.info("worker pool closing", &[]);
    self.shutdown_token.cancel();
    self.shared.finished.wait().await;
    self.shared.logger.info("worker pool closed", &[]);
    Ok(())
  }

  async fn supervise(unit_handles: Vec<JoinHandle<Result<(), WorkerError>>>, shared: Arc<PoolShared>) {
    let mut completion = CompletionGuard {
      units: unit_handles.len(),
      failed: 0,
      shared,
    };

    for joined in join_all(unit_handles).await {
      match joined {
        Ok(Ok(())) => {}
        Ok(Err(_)) => completion.failed += 1,
        Err(join_error) => {
          completion.failed += 1;
          completion
            .shared
            .logger
            .error("worker unit aborted", &[("error", LogValue::display(&join_error))]);
        }
      }
    }
  }

  async fn run_unit(
    unit: usize,
    worker: Arc<dyn Worker>,
    shutdown: CancellationToken,
    logger: Logger,
    _active_guard: ActiveUnitGuard,
  ) -> Result<(), WorkerError> {
    logger.debug("worker unit started", &[("unit", unit.into())]);

    match AssertUnwindSafe(worker.process(shutdown)).catch_unwind().await {
      Ok(Ok(())) => {
        logger.debug("worker unit finished", &[("unit", unit.into())]);
        Ok(())
      }
      Ok(Err(WorkerError::Unrecoverable(reason))) => {
        logger.error("worker aborted", &[("unit", unit.into()), ("reason", (&reason).into())]);
        Err(WorkerError::Unrecoverable(reason))
      }
      Ok(Err(err)) => {
        logger.error(
          "worker process failed",
          &[("unit", unit.into()), ("error", LogValue::display(&err))],
        );
        Err(err)
      }
      Err(panic_payload) => {
        let message = panic_message(&*panic_payload);
        Err(logger.panic("worker panicked", &[("unit", unit.into()), ("panic", message.into())]).into())
      }
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    if self.state() == PoolState::Running && !self.shutdown_token.is_cancelled() {
      self
        .shared
        .logger
        .debug("pool dropped while running, cancelling shutdown token", &[]);
      self.shutdown_token.cancel();
    }
  }
}

/// Marks the run finished when the supervisor ends, including when the runtime
/// drops it before every unit has been joined.
struct CompletionGuard {
  units: usize,
  failed: usize,
  shared: Arc<PoolShared>,
}

impl Drop for CompletionGuard {
  fn drop(&mut self) {
    *self.shared.state.lock() = PoolState::Finished;
    // Logged before the event fires so `close` callers observe it first.
    self.shared.logger.info(
      "worker pool finished",
      &[("workers", self.units.into()), ("failed", self.failed.into())],
    );
    self.shared.finished.set();
  }
}

/// Counts a unit as active from spawn until its task is dropped, including when the
/// runtime cancels it.
struct ActiveUnitGuard {
  counter: Arc<AtomicUsize>,
}

impl ActiveUnitGuard {
  fn acquire(counter: &Arc<AtomicUsize>) -> Self {
    counter.fetch_add(1, AtomicOrdering::SeqCst);
    Self {
      counter: counter.clone(),
    }
  }
}

impl Drop for ActiveUnitGuard {
  fn drop(&mut self) {
    self.counter.fetch_sub(1, AtomicOrdering::SeqCst);
  }
}

fn same_instance(a: &Arc<dyn Worker>, b: &Arc<dyn Worker>) -> bool {
  Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
