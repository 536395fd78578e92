use std::sync::Arc;
use std::time::Duration;

use tracing::Level;
use workerpool::{async_trait, logger, CancellationToken, LogValue, LoggerConfig, Worker, WorkerError, WorkerPool};

struct Counter {
  name: String,
  steps: u32,
}

#[async_trait]
impl Worker for Counter {
  fn name(&self) -> &str {
    &self.name
  }

  async fn process(&self, _shutdown: CancellationToken) -> Result<(), WorkerError> {
    let log = logger::instance().with(&[("worker", (&self.name).into())]);
    for step in 1..=self.steps {
      tokio::time::sleep(Duration::from_millis(100)).await;
      log.info("step done", &[("step", step.into())]);
    }
    Ok(())
  }
}

struct Flaky;

#[async_trait]
impl Worker for Flaky {
  fn name(&self) -> &str {
    "flaky"
  }

  async fn process(&self, _shutdown: CancellationToken) -> Result<(), WorkerError> {
    tokio::time::sleep(Duration::from_millis(150)).await;
    Err(WorkerError::failed("upstream refused connection"))
  }
}

#[tokio::main]
async fn main() {
  let log = logger::init(Some(LoggerConfig {
    level: Level::DEBUG,
    ..LoggerConfig::default()
  }));
  log.info("--- Basic Usage Example ---", &[]);

  let pool = match WorkerPool::from_global() {
    Ok(pool) => pool,
    Err(err) => log.fatal("cannot build pool", &[("error", LogValue::display(&err))]),
  };

  let workers: Vec<Arc<dyn Worker>> = vec![
    Arc::new(Counter {
      name: "short".to_string(),
      steps: 2,
    }),
    Arc::new(Counter {
      name: "long".to_string(),
      steps: 4,
    }),
    Arc::new(Flaky),
  ];
  for worker in workers {
    if let Err(err) = pool.register(worker) {
      log.error("registration failed", &[("error", LogValue::display(&err))]);
    }
  }

  // Runs until every worker has returned; the flaky one only produces a log record.
  if let Err(err) = pool.start().await {
    log.error("pool did not run", &[("error", LogValue::display(&err))]);
  }

  log.info("--- Basic Usage Example End ---", &[]);
}
