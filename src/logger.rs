use crate::config::{LogFormat, LoggerConfig};
use crate::context::RequestContext;
use crate::error::WorkerError;
use crate::record::{self, Attr, Attribute, JsonRecord, RecordAttrs};

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{field, Dispatch, Level};
use tracing_subscriber::fmt::time::{ChronoLocal, SystemTime};

const LOG_TARGET: &str = "workerpool";

lazy_static::lazy_static! {
  static ref GLOBAL_LOGGER: Mutex<Option<Logger>> = Mutex::new(None);
}

#[derive(Error, Debug, PartialEq)]
pub enum LoggerError {
  #[error("logger not initialized")]
  NotInitialized,

  #[error("a global tracing dispatcher has already been installed")]
  GlobalDefaultAlreadySet,
}

/// Returned by `Logger::panic` after the record has been written.
///
/// Propagate it out of the failing code path; a `WorkerPool` unit turns it into
/// a failed-unit outcome instead of tearing anything down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Unrecoverable {
  message: String,
}

impl Unrecoverable {
  pub fn message(&self) -> &str {
    &self.message
  }
}

impl From<Unrecoverable> for WorkerError {
  fn from(err: Unrecoverable) -> Self {
    WorkerError::Unrecoverable(err.message)
  }
}

struct Sink {
  dispatch: Dispatch,
  level: Level,
  format: LogFormat,
  add_source: bool,
}

/// A leveled logging handle.
///
/// Handles are cheap to clone and immutable: `with`, `with_group` and `with_context`
/// derive new handles that share the same sink.
#[derive(Clone)]
pub struct Logger {
  sink: Arc<Sink>,
  groups: Arc<[Arc<str>]>,
  attrs: Arc<[Attribute]>,
}

impl fmt::Debug for Logger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Logger")
      .field("level", &self.sink.level)
      .field("format", &self.sink.format)
      .field("add_source", &self.sink.add_source)
      .field("groups", &self.groups)
      .field("attrs", &self.attrs.len())
      .finish()
  }
}

/// Initializes the process-wide logger. Only the first call's configuration is used;
/// every later call returns that same logger. `None` selects `LoggerConfig::default()`.
pub fn init(config: Option<LoggerConfig>) -> Logger {
  let mut slot = GLOBAL_LOGGER.lock();
  if let Some(existing) = slot.as_ref() {
    return existing.clone();
  }
  let logger = Logger::new(config.unwrap_or_default());
  *slot = Some(logger.clone());
  logger
}

pub fn try_instance() -> Result<Logger, LoggerError> {
  GLOBAL_LOGGER.lock().clone().ok_or(LoggerError::NotInitialized)
}

/// Returns the process-wide logger.
///
/// # Panics
/// Panics with "logger not initialized" if `init` has not been called. Use
/// `try_instance` where a missing logger is an expected condition.
pub fn instance() -> Logger {
  match try_instance() {
    Ok(logger) => logger,
    Err(err) => panic!("{}", err),
  }
}

impl Logger {
  /// Builds a standalone logger with its own sink.
  pub fn new(config: LoggerConfig) -> Self {
    let LoggerConfig {
      level,
      format,
      add_source,
      output,
      time_format,
    } = config;

    let builder = tracing_subscriber::fmt()
      .with_max_level(level)
      .with_target(false)
      .with_ansi(output.is_standard_stream())
      .with_writer(output.into_make_writer());

    let dispatch = match (format, time_format) {
      (LogFormat::Json, Some(pattern)) => {
        Dispatch::new(builder.event_format(JsonRecord::new(ChronoLocal::new(pattern))).finish())
      }
      (LogFormat::Json, None) => Dispatch::new(builder.event_format(JsonRecord::new(SystemTime)).finish()),
      (LogFormat::Text, Some(pattern)) => Dispatch::new(
        builder
          .fmt_fields(record::text_fields())
          .with_timer(ChronoLocal::new(pattern))
          .finish(),
      ),
      (LogFormat::Text, None) => Dispatch::new(builder.fmt_fields(record::text_fields()).finish()),
    };

    Self {
      sink: Arc::new(Sink {
        dispatch,
        level,
        format,
        add_source,
      }),
      groups: Arc::from(Vec::new()),
      attrs: Arc::from(Vec::new()),
    }
  }

  pub fn level(&self) -> Level {
    self.sink.level
  }

  /// The underlying `tracing` sink.
  pub fn dispatch(&self) -> &Dispatch {
    &self.sink.dispatch
  }

  /// True when both handles were derived from the same `Logger::new` call.
  pub fn shares_sink_with(&self, other: &Logger) -> bool {
    Arc::ptr_eq(&self.sink, &other.sink)
  }

  /// Installs this logger's sink as the global `tracing` dispatcher, so plain
  /// `tracing` macros elsewhere in the process end up in the same place.
  pub fn set_default(&self) -> Result<(), LoggerError> {
    tracing::dispatcher::set_global_default(self.sink.dispatch.clone())
      .map_err(|_| LoggerError::GlobalDefaultAlreadySet)
  }

  pub fn with(&self, attrs: &[Attr<'_>]) -> Logger {
    if attrs.is_empty() {
      return self.clone();
    }
    let mut merged = self.attrs.to_vec();
    merged.extend(attrs.iter().map(|(key, value)| Attribute {
      groups: self.groups.clone(),
      key: key.to_string(),
      value: value.clone(),
    }));
    Logger {
      sink: self.sink.clone(),
      groups: self.groups.clone(),
      attrs: merged.into(),
    }
  }

  /// Keys attached after this call, and per-record keys, are nested under `name`:
  /// `name.key` in text output, `{"name": {"key": ..}}` in JSON output.
  pub fn with_group(&self, name: &str) -> Logger {
    if name.is_empty() {
      return self.clone();
    }
    let mut groups = self.groups.to_vec();
    groups.push(Arc::from(name));
    Logger {
      sink: self.sink.clone(),
      groups: groups.into(),
      attrs: self.attrs.clone(),
    }
  }

  /// Attaches `request_id` and `user_id` from `ctx`. Borrows `self` unchanged when
  /// the context carries neither.
  pub fn with_context<'a>(&'a self, ctx: &RequestContext) -> Cow<'a, Logger> {
    let mut attrs: Vec<Attr<'_>> = Vec::with_capacity(2);
    if let Some(request_id) = &ctx.request_id {
      attrs.push(("request_id", request_id.into()));
    }
    if let Some(user_id) = ctx.user_id {
      attrs.push(("user_id", user_id.into()));
    }
    if attrs.is_empty() {
      Cow::Borrowed(self)
    } else {
      Cow::Owned(self.with(&attrs))
    }
  }

  /// `with_context` applied to the current task's `RequestContext`, if any.
  pub fn with_current_context(&self) -> Cow<'_, Logger> {
    match RequestContext::current() {
      Some(ctx) => self.with_context(&ctx),
      None => Cow::Borrowed(self),
    }
  }

  #[track_caller]
  pub fn debug(&self, msg: &str, args: &[Attr<'_>]) {
    self.emit(Level::DEBUG, msg, args, Location::caller());
  }

  #[track_caller]
  pub fn info(&self, msg: &str, args: &[Attr<'_>]) {
    self.emit(Level::INFO, msg, args, Location::caller());
  }

  #[track_caller]
  pub fn warn(&self, msg: &str, args: &[Attr<'_>]) {
    self.emit(Level::WARN, msg, args, Location::caller());
  }

  #[track_caller]
  pub fn error(&self, msg: &str, args: &[Attr<'_>]) {
    self.emit(Level::ERROR, msg, args, Location::caller());
  }

  /// Logs at error level and hands back an `Unrecoverable` carrying `msg`.
  #[track_caller]
  #[must_use = "propagate the Unrecoverable error to the caller"]
  pub fn panic(&self, msg: &str, args: &[Attr<'_>]) -> Unrecoverable {
    self.emit(Level::ERROR, msg, args, Location::caller());
    Unrecoverable {
      message: msg.to_string(),
    }
  }

  /// Logs at error level and exits the process with status 1. Nothing unwinds.
  #[track_caller]
  pub fn fatal(&self, msg: &str, args: &[Attr<'_>]) -> ! {
    self.emit(Level::ERROR, msg, args, Location::caller());
    std::process::exit(1)
  }

  fn emit(&self, level: Level, msg: &str, args: &[Attr<'_>], caller: &'static Location<'static>) {
    if level > self.sink.level {
      return;
    }

    let record_attrs = RecordAttrs {
      format: self.sink.format,
      groups: &self.groups,
      attrs: &self.attrs,
      args,
    };
    let attrs = (!record_attrs.is_empty()).then(|| field::display(&record_attrs));
    let source = self.sink.add_source.then(|| field::display(caller));

    tracing::dispatcher::with_default(&self.sink.dispatch, || match level {
      Level::ERROR => tracing::event!(target: LOG_TARGET, Level::ERROR, attrs, source, "{}", msg),
      Level::WARN => tracing::event!(target: LOG_TARGET, Level::WARN, attrs, source, "{}", msg),
      Level::INFO => tracing::event!(target: LOG_TARGET, Level::INFO, attrs, source, "{}", msg),
      Level::DEBUG => tracing::event!(target: LOG_TARGET, Level::DEBUG, attrs, source, "{}", msg),
      _ => tracing::event!(target: LOG_TARGET, Level::TRACE, attrs, source, "{}", msg),
    });
  }
}
