mod common;

use common::CaptureBuffer;

use tracing::Level;
use workerpool::logger;
use workerpool::{LoggerConfig, LoggerError, WorkerPool};

// Single test: the process-wide logger can only be initialized once per binary.
#[test]
fn test_first_init_wins_for_the_whole_process() {
  assert_eq!(logger::try_instance().unwrap_err(), LoggerError::NotInitialized);
  assert_eq!(WorkerPool::from_global().unwrap_err(), LoggerError::NotInitialized);

  let first_capture = CaptureBuffer::new();
  let second_capture = CaptureBuffer::new();

  let first = logger::init(Some(LoggerConfig {
    level: Level::DEBUG,
    output: first_capture.output(),
    ..LoggerConfig::default()
  }));
  let second = logger::init(Some(LoggerConfig {
    level: Level::ERROR,
    output: second_capture.output(),
    ..LoggerConfig::default()
  }));
  let defaulted = logger::init(None);

  assert!(first.shares_sink_with(&second));
  assert!(first.shares_sink_with(&defaulted));
  assert_eq!(second.level(), Level::DEBUG);

  let instance = logger::instance();
  assert!(instance.shares_sink_with(&first));
  instance.debug("through the singleton", &[]);

  assert!(first_capture.contents().contains("through the singleton"));
  assert!(second_capture.contents().is_empty());

  let pool = WorkerPool::from_global().unwrap();
  assert_eq!(pool.worker_count(), 0);
}
