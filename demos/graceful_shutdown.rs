use std::sync::Arc;
use std::time::Duration;

use workerpool::{async_trait, CancellationToken, LogValue, Logger, LoggerConfig, Worker, WorkerError, WorkerPool};

/// Polls on an interval until the pool asks it to stop.
struct Poller {
  name: String,
  interval: Duration,
  log: Logger,
}

#[async_trait]
impl Worker for Poller {
  fn name(&self) -> &str {
    &self.name
  }

  async fn process(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
    let mut ticks = 0u64;
    loop {
      tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
          self.log.info("shutdown observed", &[("ticks", ticks.into())]);
          return Ok(());
        }
        _ = tokio::time::sleep(self.interval) => {
          ticks += 1;
          self.log.debug("tick", &[("ticks", ticks.into())]);
        }
      }
    }
  }
}

#[tokio::main]
async fn main() {
  let log = Logger::new(LoggerConfig::from_env());
  log.info("--- Graceful Shutdown Example ---", &[]);

  let pool = Arc::new(WorkerPool::new(&log));
  for (name, interval_ms) in [("orders", 50u64), ("trades", 120), ("balances", 200)] {
    let worker = Arc::new(Poller {
      name: name.to_string(),
      interval: Duration::from_millis(interval_ms),
      log: log.with(&[("worker", name.into())]),
    });
    if let Err(err) = pool.register(worker) {
      log.error("registration failed", &[("error", LogValue::display(&err))]);
    }
  }

  let pool_for_start = pool.clone();
  let start_jh = tokio::spawn(async move { pool_for_start.start().await });

  tokio::time::sleep(Duration::from_millis(500)).await;
  log.info("requesting shutdown", &[("active", pool.active_worker_count().into())]);

  // Returns once every poller has seen the cancellation and returned.
  if let Err(err) = pool.close().await {
    log.error("close failed", &[("error", LogValue::display(&err))]);
  }
  match start_jh.await {
    Ok(Ok(())) => log.info("pool run completed", &[]),
    Ok(Err(err)) => log.error("pool did not run", &[("error", LogValue::display(&err))]),
    Err(join_error) => log.error("start task failed", &[("error", LogValue::display(&join_error))]),
  }

  log.info("--- Graceful Shutdown Example End ---", &[]);
}
