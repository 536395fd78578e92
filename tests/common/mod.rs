#![allow(dead_code)]

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tracing::Level;
use workerpool::{async_trait, CancellationToken, LogOutput, Logger, LoggerConfig, Worker, WorkerError};

/// In-memory log destination shared between a test and the logger writing to it.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
  bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn output(&self) -> LogOutput {
    let buffer = self.clone();
    LogOutput::writer(move || buffer.clone())
  }

  pub fn logger(&self, level: Level) -> Logger {
    Logger::new(LoggerConfig {
      level,
      output: self.output(),
      ..LoggerConfig::default()
    })
  }

  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.bytes.lock().unwrap()).into_owned()
  }

  pub fn lines(&self) -> Vec<String> {
    self.contents().lines().map(str::to_owned).collect()
  }

  pub fn lines_at(&self, level: &str) -> Vec<String> {
    let marker = format!(" {} ", level);
    self.lines().into_iter().filter(|line| line.contains(&marker)).collect()
  }

  pub fn position_of(&self, needle: &str) -> Option<usize> {
    self.lines().iter().position(|line| line.contains(needle))
  }
}

impl io::Write for CaptureBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.bytes.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// What a `ScriptedWorker` does when processed.
pub enum Behavior {
  Succeed,
  SucceedAfter(Duration),
  Fail(&'static str),
  Panic(&'static str),
  /// Reports an unrecoverable condition through the given logger.
  Abort(Logger, &'static str),
  /// Fails with an error whose `Display` implementation panics.
  FailUnprintable,
  /// Runs until the shutdown token is cancelled.
  UntilCancelled,
  /// Sleeps for the full duration regardless of cancellation.
  IgnoreCancellation(Duration),
}

pub struct ScriptedWorker {
  name: String,
  behavior: Behavior,
  completed: Arc<AtomicUsize>,
}

impl ScriptedWorker {
  pub fn new(name: &str, behavior: Behavior, completed: &Arc<AtomicUsize>) -> Arc<Self> {
    Arc::new(Self {
      name: name.to_string(),
      behavior,
      completed: completed.clone(),
    })
  }

  fn mark_completed(&self) {
    self.completed.fetch_add(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl Worker for ScriptedWorker {
  fn name(&self) -> &str {
    &self.name
  }

  async fn process(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
    match &self.behavior {
      Behavior::Succeed => {
        self.mark_completed();
        Ok(())
      }
      Behavior::SucceedAfter(duration) => {
        sleep(*duration).await;
        self.mark_completed();
        Ok(())
      }
      Behavior::Fail(reason) => {
        self.mark_completed();
        Err(WorkerError::failed(reason))
      }
      Behavior::Panic(message) => {
        self.mark_completed();
        panic!("{}", message);
      }
      Behavior::Abort(logger, message) => {
        self.mark_completed();
        Err(logger.panic(message, &[("worker", (&self.name).into())]).into())
      }
      Behavior::FailUnprintable => {
        self.mark_completed();
        Err(WorkerError::Other(Box::new(UnprintableError)))
      }
      Behavior::UntilCancelled => {
        shutdown.cancelled().await;
        self.mark_completed();
        Ok(())
      }
      Behavior::IgnoreCancellation(duration) => {
        sleep(*duration).await;
        self.mark_completed();
        Ok(())
      }
    }
  }
}

#[derive(Debug)]
pub struct UnprintableError;

impl fmt::Display for UnprintableError {
  fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
    panic!("error cannot be rendered");
  }
}

impl std::error::Error for UnprintableError {}
