use std::env;
use std::fmt;

use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};

pub const LEVEL_ENV: &str = "LOG_LEVEL";
pub const FORMAT_ENV: &str = "LOG_FORMAT";
pub const ADD_SOURCE_ENV: &str = "LOG_ADD_SOURCE";
pub const TIME_FORMAT_ENV: &str = "LOG_TIME_FORMAT";

/// Record layout produced by a `Logger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
  /// One JSON object per record.
  Json,
  /// Human-readable `key=value` lines.
  #[default]
  Text,
}

impl LogFormat {
  /// `"json"` (any case) selects JSON; every other value falls back to text.
  pub fn parse(value: &str) -> Self {
    if value.trim().eq_ignore_ascii_case("json") {
      LogFormat::Json
    } else {
      LogFormat::Text
    }
  }
}

/// Destination stream for emitted records.
#[derive(Default)]
pub enum LogOutput {
  #[default]
  Stdout,
  Stderr,
  Writer(BoxMakeWriter),
}

impl LogOutput {
  /// Wraps any `tracing_subscriber` writer factory, e.g. a closure returning an `io::Write`.
  pub fn writer<M>(make_writer: M) -> Self
  where
    M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
  {
    LogOutput::Writer(BoxMakeWriter::new(make_writer))
  }

  pub(crate) fn is_standard_stream(&self) -> bool {
    !matches!(self, LogOutput::Writer(_))
  }

  pub(crate) fn into_make_writer(self) -> BoxMakeWriter {
    match self {
      LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
      LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
      LogOutput::Writer(make_writer) => make_writer,
    }
  }
}

impl fmt::Debug for LogOutput {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LogOutput::Stdout => f.write_str("Stdout"),
      LogOutput::Stderr => f.write_str("Stderr"),
      LogOutput::Writer(_) => f.write_str("Writer(..)"),
    }
  }
}

/// Configuration consumed once when a `Logger` is built.
#[derive(Debug)]
pub struct LoggerConfig {
  /// Minimum severity emitted; lower records are dropped by the sink.
  pub level: Level,
  /// `Json` writes one object per line: `time`, `level`, `msg`, optional `source`,
  /// then the attributes with groups as nested objects.
  pub format: LogFormat,
  /// Attach the caller's `file:line:column` as a `source` field.
  pub add_source: bool,
  pub output: LogOutput,
  /// strftime-style pattern used to render each record's timestamp, written under
  /// the `time` key in JSON output and as the line prefix in text output.
  pub time_format: Option<String>,
}

impl Default for LoggerConfig {
  fn default() -> Self {
    Self {
      level: Level::INFO,
      format: LogFormat::Text,
      add_source: false,
      output: LogOutput::Stdout,
      time_format: None,
    }
  }
}

impl LoggerConfig {
  /// Reads `LOG_LEVEL`, `LOG_FORMAT`, `LOG_ADD_SOURCE` and `LOG_TIME_FORMAT`.
  ///
  /// Missing or unparseable values keep their defaults. Output is always stdout.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let defaults = Self::default();
    Self {
      level: lookup(LEVEL_ENV)
        .and_then(|raw| raw.trim().parse::<Level>().ok())
        .unwrap_or(defaults.level),
      format: lookup(FORMAT_ENV)
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or(defaults.format),
      add_source: lookup(ADD_SOURCE_ENV)
        .map(|raw| parse_flag(&raw))
        .unwrap_or(defaults.add_source),
      output: defaults.output,
      time_format: lookup(TIME_FORMAT_ENV).filter(|pattern| !pattern.trim().is_empty()),
    }
  }
}

fn parse_flag(raw: &str) -> bool {
  matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key: &str| vars.get(key).cloned()
  }

  #[test]
  fn unknown_format_falls_back_to_text() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
    assert_eq!(LogFormat::parse("logfmt"), LogFormat::Text);
    assert_eq!(LogFormat::parse(""), LogFormat::Text);
  }

  #[test]
  fn empty_environment_yields_defaults() {
    let config = LoggerConfig::from_lookup(lookup_from(&[]));
    assert_eq!(config.level, Level::INFO);
    assert_eq!(config.format, LogFormat::Text);
    assert!(!config.add_source);
    assert!(config.time_format.is_none());
    assert!(config.output.is_standard_stream());
  }

  #[test]
  fn environment_values_are_applied() {
    let config = LoggerConfig::from_lookup(lookup_from(&[
      (LEVEL_ENV, "debug"),
      (FORMAT_ENV, "json"),
      (ADD_SOURCE_ENV, "Yes"),
      (TIME_FORMAT_ENV, "%H:%M:%S"),
    ]));
    assert_eq!(config.level, Level::DEBUG);
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.add_source);
    assert_eq!(config.time_format.as_deref(), Some("%H:%M:%S"));
  }

  #[test]
  fn garbage_level_keeps_default() {
    let config = LoggerConfig::from_lookup(lookup_from(&[(LEVEL_ENV, "loud"), (TIME_FORMAT_ENV, "  ")]));
    assert_eq!(config.level, Level::INFO);
    assert!(config.time_format.is_none());
  }
}
